//! Clip, Centralize, Normalize and Standardize

use serde::{Deserialize, Serialize};

use super::{Transform, DEFAULT_EPS};
use crate::{IntoSignal, RLError, Result, Signal};

/// Elementwise clamp into `[a_min, a_max]`
///
/// The bounds are checked again on every [`apply`](Transform::apply), so a
/// clip built as a literal or deserialized with an empty interval reports
/// [`RLError::Value`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Lower bound
    pub a_min: f64,
    /// Upper bound
    pub a_max: f64,
}

impl Clip {
    /// Create a clip transform, rejecting an empty interval
    pub fn new(a_min: f64, a_max: f64) -> Result<Self> {
        let clip = Self { a_min, a_max };
        clip.check_bounds()?;
        Ok(clip)
    }

    fn check_bounds(&self) -> Result<()> {
        let (a_min, a_max) = (self.a_min, self.a_max);
        if a_min > a_max || a_min.is_nan() || a_max.is_nan() {
            return Err(RLError::Value(format!(
                "clip bounds must satisfy a_min <= a_max, got [{a_min}, {a_max}]"
            )));
        }
        Ok(())
    }

    /// Symmetric clip into `[-bound, bound]`
    pub fn symmetric(bound: f64) -> Result<Self> {
        Self::new(-bound, bound)
    }
}

impl Transform for Clip {
    type Output = Signal;

    fn apply<X: IntoSignal>(&self, x: X) -> Result<Signal> {
        self.check_bounds()?;
        let x = x.into_signal()?;
        Ok(x.map(|v| v.clamp(self.a_min, self.a_max)))
    }
}

/// Subtract a mean from every element
///
/// The mean is computed from the input unless one is supplied. A scalar is
/// returned unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Centralize {
    /// Fixed mean, or `None` to use the input's own mean
    pub mean: Option<f64>,
}

impl Centralize {
    /// Centralize around the input's own mean
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Centralize around a fixed mean
    #[must_use]
    pub fn with_mean(mut self, mean: f64) -> Self {
        self.mean = Some(mean);
        self
    }
}

impl Transform for Centralize {
    type Output = Signal;

    fn apply<X: IntoSignal>(&self, x: X) -> Result<Signal> {
        match x.into_signal()? {
            Signal::Scalar(v) => Ok(Signal::Scalar(v)),
            Signal::Vector(v) => {
                let Some(mean) = self.mean.or_else(|| v.mean()) else {
                    return Ok(Signal::Vector(v));
                };
                Ok(Signal::Vector(v.mapv(|e| e - mean)))
            }
        }
    }
}

/// Min-max scaling into `[0, 1]`: `(x - min) / (max - min + eps)`
///
/// Bounds are computed from the input unless supplied. A scalar has no
/// range of its own and is clamped into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalize {
    /// Fixed lower bound
    pub min_val: Option<f64>,
    /// Fixed upper bound
    pub max_val: Option<f64>,
    /// Added to the range to avoid dividing by zero
    pub eps: f64,
}

impl Default for Normalize {
    fn default() -> Self {
        Self {
            min_val: None,
            max_val: None,
            eps: DEFAULT_EPS,
        }
    }
}

impl Normalize {
    /// Normalize with bounds taken from the input
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override epsilon
    #[must_use]
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Use fixed bounds instead of the input's extremes
    #[must_use]
    pub fn with_bounds(mut self, min_val: f64, max_val: f64) -> Self {
        self.min_val = Some(min_val);
        self.max_val = Some(max_val);
        self
    }
}

impl Transform for Normalize {
    type Output = Signal;

    fn apply<X: IntoSignal>(&self, x: X) -> Result<Signal> {
        match x.into_signal()? {
            Signal::Scalar(v) => Ok(Signal::Scalar(v.clamp(0.0, 1.0))),
            Signal::Vector(v) => {
                if v.is_empty() {
                    return Ok(Signal::Vector(v));
                }
                let min_val = self
                    .min_val
                    .unwrap_or_else(|| v.iter().copied().fold(f64::INFINITY, f64::min));
                let max_val = self
                    .max_val
                    .unwrap_or_else(|| v.iter().copied().fold(f64::NEG_INFINITY, f64::max));
                let range = max_val - min_val + self.eps;
                Ok(Signal::Vector(v.mapv(|e| (e - min_val) / range)))
            }
        }
    }
}

/// Zero-mean, unit-variance scaling: `(x - mean) / (std + eps)`
///
/// Moments are population statistics of the input unless supplied. A scalar
/// is returned unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standardize {
    /// Fixed mean
    pub mean: Option<f64>,
    /// Fixed standard deviation
    pub std: Option<f64>,
    /// Added to the standard deviation to avoid dividing by zero
    pub eps: f64,
}

impl Default for Standardize {
    fn default() -> Self {
        Self {
            mean: None,
            std: None,
            eps: DEFAULT_EPS,
        }
    }
}

impl Standardize {
    /// Standardize with moments taken from the input
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override epsilon
    #[must_use]
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Use fixed moments instead of the input's own
    #[must_use]
    pub fn with_moments(mut self, mean: f64, std: f64) -> Self {
        self.mean = Some(mean);
        self.std = Some(std);
        self
    }
}

impl Transform for Standardize {
    type Output = Signal;

    fn apply<X: IntoSignal>(&self, x: X) -> Result<Signal> {
        match x.into_signal()? {
            Signal::Scalar(v) => Ok(Signal::Scalar(v)),
            Signal::Vector(v) => {
                let Some(mean) = self.mean.or_else(|| v.mean()) else {
                    return Ok(Signal::Vector(v));
                };
                let std = self.std.unwrap_or_else(|| v.std(0.0));
                let denom = std + self.eps;
                Ok(Signal::Vector(v.mapv(|e| (e - mean) / denom)))
            }
        }
    }
}
