//! Streaming mean and variance with Chan's parallel merge

use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{IntoBatch, RLError, Result};

/// Online estimate of the per-feature mean and variance of a stream of batches
///
/// Every call to [`update`](Self::update) folds one batch into the running
/// state without keeping history. Statistics are population (ddof = 0)
/// moments. Mean and variance are `None` until the first update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMeanStd {
    mean: Option<ArrayD<f64>>,
    var: Option<ArrayD<f64>>,
    count: u64,
}

impl RunningMeanStd {
    /// Empty estimator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch into the running statistics
    ///
    /// A scalar is one sample of one feature, a flat sequence of length `N`
    /// is `N` samples of one feature, and higher-rank input is used as-is
    /// with axis 0 indexing samples. The feature shape must match the one
    /// seen on the first update.
    pub fn update<X: IntoBatch>(&mut self, x: X) -> Result<()> {
        let batch = x.into_batch()?;
        let batch_count = batch.len_of(Axis(0));
        let batch_mean = batch.mean_axis(Axis(0)).ok_or_else(|| {
            RLError::Shape("cannot update running statistics with an empty batch".to_string())
        })?;
        let batch_var = batch.var_axis(Axis(0), 0.0);

        let (mean, var) = match (&self.mean, &self.var) {
            (Some(mean), Some(var)) => {
                if mean.shape() != batch_mean.shape() {
                    return Err(RLError::Shape(format!(
                        "feature shape {:?} does not match running statistics of shape {:?}",
                        batch_mean.shape(),
                        mean.shape()
                    )));
                }
                merge(mean, var, self.count, &batch_mean, &batch_var, batch_count)
            }
            _ => {
                debug!(feature_shape = ?batch_mean.shape(), batch_count, "initialized running statistics");
                (batch_mean, batch_var)
            }
        };

        self.mean = Some(mean);
        self.var = Some(var);
        self.count += batch_count as u64;
        Ok(())
    }

    /// Running mean squeezed to the feature shape (size-1 axes removed)
    #[must_use]
    pub fn mean(&self) -> Option<ArrayD<f64>> {
        self.mean.as_ref().map(squeeze)
    }

    /// Running population variance, squeezed
    #[must_use]
    pub fn variance(&self) -> Option<ArrayD<f64>> {
        self.var.as_ref().map(squeeze)
    }

    /// Running population standard deviation, squeezed
    #[must_use]
    pub fn standard_deviation(&self) -> Option<ArrayD<f64>> {
        self.var.as_ref().map(|var| squeeze(&var.mapv(f64::sqrt)))
    }

    /// Unsqueezed mean and variance, shaped like one sample
    #[must_use]
    pub fn moments(&self) -> Option<(&ArrayD<f64>, &ArrayD<f64>)> {
        self.mean.as_ref().zip(self.var.as_ref())
    }

    /// Number of samples seen so far
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}

#[allow(clippy::cast_precision_loss)]
fn merge(
    mean: &ArrayD<f64>,
    var: &ArrayD<f64>,
    count: u64,
    batch_mean: &ArrayD<f64>,
    batch_var: &ArrayD<f64>,
    batch_count: usize,
) -> (ArrayD<f64>, ArrayD<f64>) {
    let n = count as f64;
    let bn = batch_count as f64;
    let total = n + bn;

    let delta = batch_mean - mean;
    let new_mean = mean + &(&delta * (bn / total));
    let m2 = var * n + batch_var * bn + delta.mapv(|d| d * d) * (n * bn / total);
    (new_mean, m2 / total)
}

fn squeeze(a: &ArrayD<f64>) -> ArrayD<f64> {
    let shape: Vec<usize> = a.shape().iter().copied().filter(|&d| d != 1).collect();
    let values: Vec<f64> = a.iter().copied().collect();
    ArrayD::from_shape_vec(IxDyn(&shape), values).unwrap_or_else(|_| a.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    fn assert_values(actual: &ArrayD<f64>, expected: &[f64]) {
        let actual: Vec<f64> = actual.iter().copied().collect();
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_starts_uninitialized() {
        let rms = RunningMeanStd::new();
        assert_eq!(rms.count(), 0);
        assert!(rms.mean().is_none());
        assert!(rms.standard_deviation().is_none());
        assert!(rms.moments().is_none());
    }

    #[test]
    fn test_incremental_matches_batch() {
        let mut incremental = RunningMeanStd::new();
        for x in [1.0, 2.0, 3.0, 4.0] {
            incremental.update(x).unwrap();
        }

        let mut batch = RunningMeanStd::new();
        batch.update(vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        for rms in [&incremental, &batch] {
            assert_eq!(rms.count(), 4);
            let mean = rms.mean().unwrap();
            assert_eq!(mean.ndim(), 0);
            assert_values(&mean, &[2.5]);
            assert_values(&rms.standard_deviation().unwrap(), &[1.25_f64.sqrt()]);
        }
    }

    #[test]
    fn test_column_statistics() {
        let data = arr2(&[[1.0, 10.0, 100.0], [2.0, 20.0, 200.0], [3.0, 30.0, 300.0], [4.0, 40.0, 400.0]]);
        let mut rms = RunningMeanStd::new();
        rms.update(&data).unwrap();

        let std = 1.25_f64.sqrt();
        assert_eq!(rms.count(), 4);
        assert_values(&rms.mean().unwrap(), &[2.5, 25.0, 250.0]);
        assert_values(&rms.standard_deviation().unwrap(), &[std, 10.0 * std, 100.0 * std]);

        let (mean, var) = rms.moments().unwrap();
        assert_eq!(mean.shape(), &[3]);
        assert_eq!(var.shape(), &[3]);
    }

    #[test]
    fn test_split_batches_merge_exactly() {
        let data = arr2(&[[1.0, -3.0], [5.0, 2.0], [2.0, 8.0], [7.0, 0.5], [0.0, 1.0]]);
        let mut whole = RunningMeanStd::new();
        whole.update(&data).unwrap();

        let mut split = RunningMeanStd::new();
        split.update(data.slice(ndarray::s![..2, ..])).unwrap();
        split.update(data.slice(ndarray::s![2.., ..])).unwrap();

        assert_eq!(split.count(), whole.count());
        let expected_mean: Vec<f64> = whole.mean().unwrap().iter().copied().collect();
        let expected_var: Vec<f64> = whole.variance().unwrap().iter().copied().collect();
        assert_values(&split.mean().unwrap(), &expected_mean);
        assert_values(&split.variance().unwrap(), &expected_var);
    }

    #[test]
    fn test_feature_shape_mismatch() {
        let mut rms = RunningMeanStd::new();
        rms.update(arr2(&[[1.0, 2.0], [3.0, 4.0]])).unwrap();
        let err = rms.update(arr2(&[[1.0, 2.0, 3.0]])).unwrap_err();
        assert!(matches!(err, RLError::Shape(_)));
        assert_eq!(rms.count(), 2);
    }

    #[test]
    fn test_empty_batch() {
        let mut rms = RunningMeanStd::new();
        let err = rms.update(Vec::<f64>::new()).unwrap_err();
        assert!(matches!(err, RLError::Shape(_)));
        assert_eq!(rms.count(), 0);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut rms = RunningMeanStd::new();
        rms.update(vec![1.0, 2.0, 3.0]).unwrap();
        let json = serde_json::to_string(&rms).unwrap();
        let restored: RunningMeanStd = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, rms);
    }
}
