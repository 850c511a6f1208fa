//! Stateless transforms and online statistics over numeric signals
//!
//! Every elementwise transform accepts a scalar, a flat sequence or an
//! `ndarray` of rank ≤ 1 and rejects higher-rank input with
//! [`RLError::Shape`](crate::RLError::Shape). [`RunningMeanStd`] is the one
//! stateful member and accepts batches of any rank.

mod cumsum;
mod elementwise;
mod rank;
mod running_mean_std;
mod smooth;

pub use cumsum::{ExpFactorCumSum, IntoMask, Mask};
pub use elementwise::{Centralize, Clip, Normalize, Standardize};
pub use rank::RankTransform;
pub use running_mean_std::RunningMeanStd;
pub use smooth::PolySmooth;

use crate::{IntoSignal, Result};

/// Default epsilon used by [`Normalize`] and [`Standardize`]
pub const DEFAULT_EPS: f64 = f32::EPSILON as f64;

/// A configured transform over a rank ≤ 1 signal
pub trait Transform {
    /// Result of applying the transform
    type Output;

    /// Apply the transform to `x`
    fn apply<X: IntoSignal>(&self, x: X) -> Result<Self::Output>;
}
