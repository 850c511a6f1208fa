//! Observation and action spaces

use std::fmt::Debug;

use ndarray::Array1;
use rand::{Rng, RngCore};
use rand_distr::{Exp1, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::{RLError, Result};

/// An element of a [`Space`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpaceValue {
    /// Point in a [`BoxSpace`]
    Array(Array1<f64>),
    /// Index into a [`DiscreteSpace`]
    Discrete(usize),
    /// One element per component of a [`ProductSpace`]
    Tuple(Vec<SpaceValue>),
}

impl SpaceValue {
    /// The discrete index, if this is one
    #[must_use]
    pub fn as_discrete(&self) -> Option<usize> {
        match self {
            Self::Discrete(i) => Some(*i),
            _ => None,
        }
    }

    /// The array, if this is one
    #[must_use]
    pub fn as_array(&self) -> Option<&Array1<f64>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl From<usize> for SpaceValue {
    fn from(i: usize) -> Self {
        Self::Discrete(i)
    }
}

impl From<Array1<f64>> for SpaceValue {
    fn from(a: Array1<f64>) -> Self {
        Self::Array(a)
    }
}

/// A set of observations or actions with a flat vector encoding
pub trait Space: Debug + Send + Sync {
    /// Draw a random element
    fn sample(&self, rng: &mut dyn RngCore) -> SpaceValue;

    /// Whether `x` belongs to the space
    fn contains(&self, x: &SpaceValue) -> bool;

    /// Length of the flat encoding
    fn flat_dim(&self) -> usize;

    /// Encode an element as a flat vector
    fn flatten(&self, x: &SpaceValue) -> Result<Array1<f64>>;

    /// Decode a flat vector produced by [`flatten`](Self::flatten)
    fn unflatten(&self, x: &Array1<f64>) -> Result<SpaceValue>;

    /// Clone into a box
    fn boxed_clone(&self) -> Box<dyn Space>;
}

impl Clone for Box<dyn Space> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

fn check_len(expected: usize, x: &Array1<f64>) -> Result<()> {
    if x.len() == expected {
        Ok(())
    } else {
        Err(RLError::DimensionMismatch {
            expected,
            actual: x.len(),
        })
    }
}

/// A box in `R^n`, each dimension bounded by `low[i]..=high[i]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    low: Array1<f64>,
    high: Array1<f64>,
}

impl BoxSpace {
    /// Box with per-dimension bounds
    pub fn new(low: Array1<f64>, high: Array1<f64>) -> Result<Self> {
        if low.len() != high.len() {
            return Err(RLError::DimensionMismatch {
                expected: low.len(),
                actual: high.len(),
            });
        }
        if let Some(i) = (0..low.len()).find(|&i| !(low[i] <= high[i])) {
            return Err(RLError::Value(format!(
                "lower bound {} exceeds upper bound {} in dimension {i}",
                low[i], high[i]
            )));
        }
        Ok(Self { low, high })
    }

    /// Box with the same bounds in every one of `dim` dimensions
    pub fn uniform(low: f64, high: f64, dim: usize) -> Result<Self> {
        Self::new(Array1::from_elem(dim, low), Array1::from_elem(dim, high))
    }

    /// Lower bounds
    #[must_use]
    pub fn low(&self) -> &Array1<f64> {
        &self.low
    }

    /// Upper bounds
    #[must_use]
    pub fn high(&self) -> &Array1<f64> {
        &self.high
    }

    /// Shape of an element
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        vec![self.low.len()]
    }
}

impl Space for BoxSpace {
    /// Uniform inside finite bounds; unbounded sides are sampled from a
    /// standard normal or a shifted exponential.
    fn sample(&self, rng: &mut dyn RngCore) -> SpaceValue {
        let values = self
            .low
            .iter()
            .zip(&self.high)
            .map(|(&lo, &hi)| match (lo.is_finite(), hi.is_finite()) {
                (true, true) if lo < hi => rng.gen_range(lo..=hi),
                (true, true) => lo,
                (true, false) => lo + rng.sample::<f64, _>(Exp1),
                (false, true) => hi - rng.sample::<f64, _>(Exp1),
                (false, false) => rng.sample(StandardNormal),
            })
            .collect();
        SpaceValue::Array(values)
    }

    fn contains(&self, x: &SpaceValue) -> bool {
        match x {
            SpaceValue::Array(a) => {
                a.len() == self.low.len()
                    && a.iter()
                        .zip(&self.low)
                        .zip(&self.high)
                        .all(|((v, lo), hi)| v >= lo && v <= hi)
            }
            _ => false,
        }
    }

    fn flat_dim(&self) -> usize {
        self.low.len()
    }

    fn flatten(&self, x: &SpaceValue) -> Result<Array1<f64>> {
        let a = x
            .as_array()
            .ok_or_else(|| RLError::Type(format!("expected an array for a box space, got {x:?}")))?;
        check_len(self.flat_dim(), a)?;
        Ok(a.clone())
    }

    fn unflatten(&self, x: &Array1<f64>) -> Result<SpaceValue> {
        check_len(self.flat_dim(), x)?;
        Ok(SpaceValue::Array(x.clone()))
    }

    fn boxed_clone(&self) -> Box<dyn Space> {
        Box::new(self.clone())
    }
}

/// The integers `0..n`, flattened as one-hot vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscreteSpace {
    /// Number of elements
    pub n: usize,
}

impl DiscreteSpace {
    /// Space of `n` discrete elements
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Space for DiscreteSpace {
    fn sample(&self, rng: &mut dyn RngCore) -> SpaceValue {
        SpaceValue::Discrete(rng.gen_range(0..self.n.max(1)))
    }

    fn contains(&self, x: &SpaceValue) -> bool {
        matches!(x, SpaceValue::Discrete(i) if *i < self.n)
    }

    fn flat_dim(&self) -> usize {
        self.n
    }

    fn flatten(&self, x: &SpaceValue) -> Result<Array1<f64>> {
        match x {
            SpaceValue::Discrete(i) if *i < self.n => {
                let mut one_hot = Array1::zeros(self.n);
                one_hot[*i] = 1.0;
                Ok(one_hot)
            }
            other => Err(RLError::InvalidAction(format!(
                "{other:?} is not an element of Discrete({})",
                self.n
            ))),
        }
    }

    fn unflatten(&self, x: &Array1<f64>) -> Result<SpaceValue> {
        check_len(self.n, x)?;
        x.iter()
            .position(|&v| v != 0.0)
            .map(SpaceValue::Discrete)
            .ok_or_else(|| RLError::Value("one-hot vector has no non-zero entry".to_string()))
    }

    fn boxed_clone(&self) -> Box<dyn Space> {
        Box::new(*self)
    }
}

/// Cartesian product of component spaces
#[derive(Debug, Clone)]
pub struct ProductSpace {
    spaces: Vec<Box<dyn Space>>,
}

impl ProductSpace {
    /// Product of the given spaces, in order
    #[must_use]
    pub fn new(spaces: Vec<Box<dyn Space>>) -> Self {
        Self { spaces }
    }

    /// Component spaces
    #[must_use]
    pub fn spaces(&self) -> &[Box<dyn Space>] {
        &self.spaces
    }

    fn parts<'a>(&self, x: &'a SpaceValue) -> Result<&'a [SpaceValue]> {
        match x {
            SpaceValue::Tuple(parts) if parts.len() == self.spaces.len() => Ok(parts),
            SpaceValue::Tuple(parts) => Err(RLError::DimensionMismatch {
                expected: self.spaces.len(),
                actual: parts.len(),
            }),
            other => Err(RLError::Type(format!(
                "expected a tuple for a product space, got {other:?}"
            ))),
        }
    }
}

impl Space for ProductSpace {
    fn sample(&self, rng: &mut dyn RngCore) -> SpaceValue {
        SpaceValue::Tuple(self.spaces.iter().map(|s| s.sample(rng)).collect())
    }

    fn contains(&self, x: &SpaceValue) -> bool {
        self.parts(x)
            .map(|parts| self.spaces.iter().zip(parts).all(|(s, p)| s.contains(p)))
            .unwrap_or(false)
    }

    fn flat_dim(&self) -> usize {
        self.spaces.iter().map(|s| s.flat_dim()).sum()
    }

    fn flatten(&self, x: &SpaceValue) -> Result<Array1<f64>> {
        let parts = self.parts(x)?;
        let mut flat = Vec::with_capacity(self.flat_dim());
        for (space, part) in self.spaces.iter().zip(parts) {
            flat.extend(space.flatten(part)?.iter().copied());
        }
        Ok(Array1::from_vec(flat))
    }

    fn unflatten(&self, x: &Array1<f64>) -> Result<SpaceValue> {
        check_len(self.flat_dim(), x)?;
        let mut offset = 0;
        let mut parts = Vec::with_capacity(self.spaces.len());
        for space in &self.spaces {
            let dim = space.flat_dim();
            let chunk = x.slice(ndarray::s![offset..offset + dim]).to_owned();
            parts.push(space.unflatten(&chunk)?);
            offset += dim;
        }
        Ok(SpaceValue::Tuple(parts))
    }

    fn boxed_clone(&self) -> Box<dyn Space> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_box_space() {
        let space = BoxSpace::new(arr1(&[-1.0, 0.0]), arr1(&[1.0, 5.0])).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert!(space.contains(&space.sample(&mut rng)));
        }
        assert!(!space.contains(&SpaceValue::Array(arr1(&[2.0, 1.0]))));
        assert!(!space.contains(&SpaceValue::Discrete(0)));
        assert_eq!(space.flat_dim(), 2);
    }

    #[test]
    fn test_box_space_bounds() {
        assert!(matches!(
            BoxSpace::new(arr1(&[0.0]), arr1(&[1.0, 2.0])),
            Err(RLError::DimensionMismatch { expected: 1, actual: 2 })
        ));
        assert!(matches!(BoxSpace::uniform(1.0, -1.0, 3), Err(RLError::Value(_))));
    }

    #[test]
    fn test_unbounded_box_samples_are_finite() {
        let space = BoxSpace::uniform(f64::NEG_INFINITY, f64::INFINITY, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let x = space.sample(&mut rng);
        assert!(x.as_array().unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_discrete_one_hot() {
        let space = DiscreteSpace::new(4);
        let flat = space.flatten(&SpaceValue::Discrete(2)).unwrap();
        assert_eq!(flat, arr1(&[0.0, 0.0, 1.0, 0.0]));
        assert_eq!(space.unflatten(&flat).unwrap(), SpaceValue::Discrete(2));
        assert!(space.flatten(&SpaceValue::Discrete(4)).is_err());
    }

    #[test]
    fn test_product_space() {
        let space = ProductSpace::new(vec![
            Box::new(DiscreteSpace::new(3)),
            Box::new(BoxSpace::uniform(-1.0, 1.0, 2).unwrap()),
        ]);
        assert_eq!(space.flat_dim(), 5);

        let x = SpaceValue::Tuple(vec![
            SpaceValue::Discrete(1),
            SpaceValue::Array(arr1(&[0.5, -0.25])),
        ]);
        assert!(space.contains(&x));
        let flat = space.flatten(&x).unwrap();
        assert_eq!(flat, arr1(&[0.0, 1.0, 0.0, 0.5, -0.25]));
        assert_eq!(space.unflatten(&flat).unwrap(), x);

        let mut rng = StdRng::seed_from_u64(7);
        assert!(space.contains(&space.sample(&mut rng)));
        assert!(!space.contains(&SpaceValue::Tuple(vec![SpaceValue::Discrete(1)])));
        assert!(space.unflatten(&arr1(&[1.0, 0.0])).is_err());
    }
}
