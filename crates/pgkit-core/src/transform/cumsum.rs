//! Masked, exponentially decayed cumulative sums (discounted returns)

use ndarray::{Array1, ArrayBase, Data, Dimension};
use serde::{Deserialize, Serialize};

use super::Transform;
use crate::{IntoSignal, RLError, Result};

/// Episode-continuation mask: `1` keeps accumulating, `0` marks a boundary
///
/// Only integer-typed 0/1 sequences are accepted. Boolean sequences are
/// rejected so that "done" flags are never passed where "continue" flags are
/// expected; build a mask from dones with [`Mask::from_dones`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask(Vec<u8>);

impl Mask {
    /// Validate an integer mask
    pub fn new(values: Vec<i64>) -> Result<Self> {
        values
            .into_iter()
            .enumerate()
            .map(|(t, v)| match v {
                0 => Ok(0),
                1 => Ok(1),
                other => Err(RLError::Value(format!(
                    "mask must be binary, found {other} at index {t}"
                ))),
            })
            .collect::<Result<Vec<u8>>>()
            .map(Self)
    }

    /// Continuation mask from episode-termination flags (`done == true` becomes `0`)
    #[must_use]
    pub fn from_dones(dones: &[bool]) -> Self {
        Self(dones.iter().map(|&done| u8::from(!done)).collect())
    }

    /// A mask of ones (no boundaries)
    #[must_use]
    pub fn ones(len: usize) -> Self {
        Self(vec![1; len])
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the mask is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mask values as `0`/`1`
    #[must_use]
    pub fn values(&self) -> &[u8] {
        &self.0
    }

    /// Append one entry
    pub fn push(&mut self, done: bool) {
        self.0.push(u8::from(!done));
    }
}

/// Conversion into a validated [`Mask`]
pub trait IntoMask {
    /// Validate and convert
    fn into_mask(self) -> Result<Mask>;
}

impl IntoMask for Mask {
    fn into_mask(self) -> Result<Mask> {
        Ok(self)
    }
}

impl IntoMask for &Mask {
    fn into_mask(self) -> Result<Mask> {
        Ok(self.clone())
    }
}

macro_rules! impl_integer_mask {
    ($($t:ty),*) => {
        $(
            impl IntoMask for &[$t] {
                fn into_mask(self) -> Result<Mask> {
                    let values = self
                        .iter()
                        .map(|&v| i64::try_from(v).unwrap_or(i64::MAX))
                        .collect();
                    Mask::new(values)
                }
            }

            impl IntoMask for Vec<$t> {
                fn into_mask(self) -> Result<Mask> {
                    self.as_slice().into_mask()
                }
            }

            impl<const N: usize> IntoMask for [$t; N] {
                fn into_mask(self) -> Result<Mask> {
                    self.as_slice().into_mask()
                }
            }
        )*
    };
}

impl_integer_mask!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl IntoMask for &[f64] {
    fn into_mask(self) -> Result<Mask> {
        self.iter()
            .enumerate()
            .map(|(t, &v)| {
                if v == 0.0 {
                    Ok(0)
                } else if v == 1.0 {
                    Ok(1)
                } else {
                    Err(RLError::Value(format!(
                        "mask must be binary, found {v} at index {t}"
                    )))
                }
            })
            .collect::<Result<Vec<u8>>>()
            .map(Mask)
    }
}

impl IntoMask for Vec<f64> {
    fn into_mask(self) -> Result<Mask> {
        self.as_slice().into_mask()
    }
}

fn boolean_mask_error() -> RLError {
    RLError::Type(
        "boolean masks are not accepted; convert dones with Mask::from_dones".to_string(),
    )
}

impl IntoMask for &[bool] {
    fn into_mask(self) -> Result<Mask> {
        Err(boolean_mask_error())
    }
}

impl IntoMask for Vec<bool> {
    fn into_mask(self) -> Result<Mask> {
        Err(boolean_mask_error())
    }
}

impl<const N: usize> IntoMask for [bool; N] {
    fn into_mask(self) -> Result<Mask> {
        Err(boolean_mask_error())
    }
}

impl<S, D> IntoMask for ArrayBase<S, D>
where
    S: Data,
    D: Dimension,
{
    fn into_mask(self) -> Result<Mask> {
        Err(RLError::Type(format!(
            "mask must be a list of 0/1 integers, got an array of shape {:?}",
            self.shape()
        )))
    }
}

/// Backward exponentially decayed cumulative sum
///
/// Computes `y[t] = x[t] + alpha * mask[t] * y[t + 1]` from the end of the
/// sequence, so with a mask the recurrence restarts at every `0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpFactorCumSum {
    alpha: f64,
}

impl ExpFactorCumSum {
    /// Create the transform; `alpha` must lie in `(0, 1]`
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(RLError::Value(format!(
                "decay factor must lie in (0, 1], got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }

    /// The decay factor
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Masked cumulative sum; `mask` must align with `x`
    pub fn apply_masked<X, M>(&self, x: X, mask: M) -> Result<Array1<f64>>
    where
        X: IntoSignal,
        M: IntoMask,
    {
        let x = x.into_signal()?.require_sequence("ExpFactorCumSum")?;
        let mask = mask.into_mask()?;
        if mask.len() != x.len() {
            return Err(RLError::Length {
                expected: x.len(),
                actual: mask.len(),
            });
        }
        Ok(self.accumulate(&x, mask.values()))
    }

    fn accumulate(&self, x: &Array1<f64>, mask: &[u8]) -> Array1<f64> {
        let mut out = Array1::zeros(x.len());
        let mut running = 0.0;
        for t in (0..x.len()).rev() {
            running = x[t] + self.alpha * f64::from(mask[t]) * running;
            out[t] = running;
        }
        out
    }
}

impl Transform for ExpFactorCumSum {
    type Output = Array1<f64>;

    fn apply<X: IntoSignal>(&self, x: X) -> Result<Array1<f64>> {
        let x = x.into_signal()?.require_sequence("ExpFactorCumSum")?;
        let ones = vec![1; x.len()];
        Ok(self.accumulate(&x, &ones))
    }
}
