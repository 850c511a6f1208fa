//! Polynomial least-squares smoothing

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::Transform;
use crate::{IntoSignal, RLError, Result, Signal};

const SVD_EPS: f64 = 1e-12;

/// Fit a polynomial of `degree` to `(index, value)` pairs and evaluate it at each index
///
/// This is a smoothing filter over the observed range, not an extrapolator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolySmooth {
    /// Polynomial degree
    pub degree: usize,
}

impl PolySmooth {
    /// Smoother with the given polynomial degree
    #[must_use]
    pub fn new(degree: usize) -> Self {
        Self { degree }
    }
}

impl Transform for PolySmooth {
    type Output = Signal;

    fn apply<X: IntoSignal>(&self, x: X) -> Result<Signal> {
        let signal = x.into_signal()?;
        let y = match &signal {
            Signal::Scalar(_) => return Ok(signal),
            Signal::Vector(v) if v.is_empty() => return Ok(signal),
            Signal::Vector(v) => v,
        };

        let n = y.len();
        let vandermonde = DMatrix::from_fn(n, self.degree + 1, |i, j| {
            (i as f64).powi(i32::try_from(j).unwrap_or(i32::MAX))
        });
        let targets = DVector::from_iterator(n, y.iter().copied());

        let coefficients = vandermonde
            .clone()
            .svd(true, true)
            .solve(&targets, SVD_EPS)
            .map_err(|e| RLError::Computation(format!("polynomial fit failed: {e}")))?;

        let fitted = vandermonde * coefficients;
        Ok(Signal::Vector(fitted.iter().copied().collect()))
    }
}
