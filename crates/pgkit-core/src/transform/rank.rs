//! Rank transform

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::Transform;
use crate::{IntoSignal, Result};

/// Replace each element by its ascending rank
///
/// Ties keep their original order. With `centered`, ranks are mapped to
/// `rank / (N - 1) - 0.5`, i.e. evenly spaced over `[-0.5, 0.5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTransform {
    /// Center the ranks around zero
    pub centered: bool,
}

impl Default for RankTransform {
    fn default() -> Self {
        Self { centered: true }
    }
}

impl RankTransform {
    /// Centered rank transform
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw 0-indexed ranks
    #[must_use]
    pub fn uncentered() -> Self {
        Self { centered: false }
    }
}

impl Transform for RankTransform {
    type Output = Array1<f64>;

    fn apply<X: IntoSignal>(&self, x: X) -> Result<Array1<f64>> {
        let x = x.into_signal()?.require_sequence("RankTransform")?;
        let n = x.len();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));

        let mut ranks = Array1::zeros(n);
        for (rank, &idx) in order.iter().enumerate() {
            ranks[idx] = rank as f64;
        }

        if self.centered {
            if n > 1 {
                let span = (n - 1) as f64;
                ranks.mapv_inplace(|r| r / span - 0.5);
            } else {
                ranks.fill(0.0);
            }
        }
        Ok(ranks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RLError;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_worked_example() {
        let a = vec![3, 14, 1];
        assert_eq!(RankTransform::uncentered().apply(&a).unwrap(), arr1(&[1.0, 2.0, 0.0]));
        assert_eq!(RankTransform::new().apply(&a).unwrap(), arr1(&[0.0, 0.5, -0.5]));

        let b = arr1(&[3.0, 14.0, 1.0]);
        assert_eq!(RankTransform::uncentered().apply(&b).unwrap(), arr1(&[1.0, 2.0, 0.0]));
        assert_eq!(RankTransform::new().apply(&b).unwrap(), arr1(&[0.0, 0.5, -0.5]));
    }

    #[test]
    fn test_ties_keep_original_order() {
        let ranks = RankTransform::uncentered().apply([2, 1, 2, 1]).unwrap();
        assert_eq!(ranks, arr1(&[2.0, 0.0, 3.0, 1.0]));
    }

    #[test]
    fn test_centered_endpoints() {
        let ranks = RankTransform::new().apply([5.0, -1.0, 2.0, 9.0, 0.0]).unwrap();
        assert_eq!(ranks, arr1(&[0.25, -0.5, 0.0, 0.5, -0.25]));
        assert_eq!(RankTransform::new().apply([7]).unwrap(), arr1(&[0.0]));
    }

    #[test]
    fn test_contract() {
        assert!(matches!(RankTransform::new().apply(5), Err(RLError::Type(_))));
        assert!(matches!(
            RankTransform::new().apply(arr2(&[[3, 14, 1]])),
            Err(RLError::Shape(_))
        ));
    }
}
