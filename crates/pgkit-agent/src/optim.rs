//! First-order optimizers over flattened parameter vectors

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::trace;

use pgkit_core::{RLError, Result};

use crate::schedule::Schedule;

/// Update rule of an [`Optimizer`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Plain gradient descent
    Sgd,
    /// Adam with bias-corrected moment estimates
    Adam {
        /// Decay of the first moment
        beta1: f64,
        /// Decay of the second moment
        beta2: f64,
        /// Denominator epsilon
        eps: f64,
    },
}

impl OptimizerKind {
    /// Adam with the usual `0.9 / 0.999 / 1e-8` constants
    #[must_use]
    pub fn adam() -> Self {
        Self::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::adam()
    }
}

/// What one optimizer step did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerStep {
    /// Learning rate used for the step
    pub learning_rate: f64,
    /// Global gradient norm before clipping
    pub grad_norm: f64,
}

/// Gradient-descent optimizer with optional global-norm clipping
///
/// The learning rate for step `t` is read from the schedule before the
/// step counter advances, so the first step uses `schedule.value(0)`.
#[derive(Debug)]
pub struct Optimizer {
    kind: OptimizerKind,
    schedule: Box<dyn Schedule>,
    max_grad_norm: Option<f64>,
    momentum: Array1<f64>,
    velocity: Array1<f64>,
    t: usize,
}

impl Optimizer {
    /// Create an optimizer following `schedule`
    pub fn new(kind: OptimizerKind, schedule: Box<dyn Schedule>) -> Self {
        Self {
            kind,
            schedule,
            max_grad_norm: None,
            momentum: Array1::zeros(0),
            velocity: Array1::zeros(0),
            t: 0,
        }
    }

    /// Rescale gradients whose global norm exceeds `max_grad_norm`
    #[must_use]
    pub fn with_max_grad_norm(mut self, max_grad_norm: Option<f64>) -> Self {
        self.max_grad_norm = max_grad_norm;
        self
    }

    /// Learning rate the next step will use
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.schedule.value(self.t)
    }

    /// Number of steps taken
    #[must_use]
    pub fn steps(&self) -> usize {
        self.t
    }

    /// Apply one update to `params` in place
    pub fn step(&mut self, params: &mut Array1<f64>, mut grad: Array1<f64>) -> Result<OptimizerStep> {
        if grad.len() != params.len() {
            return Err(RLError::DimensionMismatch {
                expected: params.len(),
                actual: grad.len(),
            });
        }
        let grad_norm = grad.dot(&grad).sqrt();
        if !grad_norm.is_finite() {
            return Err(RLError::Computation(format!("non-finite gradient norm {grad_norm}")));
        }
        if let Some(max_norm) = self.max_grad_norm {
            if grad_norm > max_norm {
                grad *= max_norm / grad_norm;
            }
        }

        let learning_rate = self.learning_rate();
        self.t += 1;

        match self.kind {
            OptimizerKind::Sgd => params.scaled_add(-learning_rate, &grad),
            OptimizerKind::Adam { beta1, beta2, eps } => {
                if self.momentum.len() != params.len() {
                    self.momentum = Array1::zeros(params.len());
                    self.velocity = Array1::zeros(params.len());
                }
                self.momentum = &self.momentum * beta1 + &grad * (1.0 - beta1);
                self.velocity = &self.velocity * beta2 + &grad.mapv(|g| g * g) * (1.0 - beta2);

                let t = i32::try_from(self.t).unwrap_or(i32::MAX);
                let m_correction = 1.0 - beta1.powi(t);
                let v_correction = 1.0 - beta2.powi(t);
                ndarray::Zip::from(params)
                    .and(&self.momentum)
                    .and(&self.velocity)
                    .for_each(|p, &m, &v| {
                        let m_hat = m / m_correction;
                        let v_hat = v / v_correction;
                        *p -= learning_rate * m_hat / (v_hat.sqrt() + eps);
                    });
            }
        }

        trace!(step = self.t, learning_rate, grad_norm, "optimizer step");
        Ok(OptimizerStep {
            learning_rate,
            grad_norm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ConstantSchedule, LinearSchedule};
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn assert_close(actual: &Array1<f64>, expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sgd_step() {
        let mut opt = Optimizer::new(OptimizerKind::Sgd, Box::new(ConstantSchedule::new(0.1)));
        let mut params = arr1(&[1.0, -1.0]);
        let report = opt.step(&mut params, arr1(&[2.0, 0.0])).unwrap();
        assert_close(&params, &[0.8, -1.0]);
        assert_abs_diff_eq!(report.grad_norm, 2.0);
        assert_eq!(opt.steps(), 1);
    }

    #[test]
    fn test_gradient_clipping() {
        let mut opt = Optimizer::new(OptimizerKind::Sgd, Box::new(ConstantSchedule::new(1.0)))
            .with_max_grad_norm(Some(1.0));
        let mut params = arr1(&[0.0, 0.0]);
        let report = opt.step(&mut params, arr1(&[3.0, 4.0])).unwrap();
        assert_abs_diff_eq!(report.grad_norm, 5.0);
        assert_close(&params, &[-0.6, -0.8]);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut opt = Optimizer::new(OptimizerKind::adam(), Box::new(ConstantSchedule::new(0.01)));
        let mut params = arr1(&[0.0, 0.0, 0.0]);
        opt.step(&mut params, arr1(&[5.0, -0.1, 0.0])).unwrap();
        assert_abs_diff_eq!(params[0], -0.01, epsilon = 1e-6);
        assert_abs_diff_eq!(params[1], 0.01, epsilon = 1e-6);
        assert_abs_diff_eq!(params[2], 0.0);
    }

    #[test]
    fn test_learning_rate_follows_schedule() {
        let mut opt = Optimizer::new(OptimizerKind::Sgd, Box::new(LinearSchedule::new(1.0, 0.0, 4)));
        let mut params = arr1(&[0.0]);
        let used: Vec<f64> = (0..5)
            .map(|_| opt.step(&mut params, arr1(&[1.0])).unwrap().learning_rate)
            .collect();
        assert_eq!(used, vec![1.0, 0.75, 0.5, 0.25, 0.0]);
        assert_abs_diff_eq!(params[0], -2.5);
    }

    #[test]
    fn test_rejects_bad_gradients() {
        let mut opt = Optimizer::new(OptimizerKind::Sgd, Box::new(ConstantSchedule::new(0.1)));
        let mut params = arr1(&[0.0, 0.0]);
        assert!(matches!(
            opt.step(&mut params, arr1(&[1.0])),
            Err(RLError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            opt.step(&mut params, arr1(&[f64::NAN, 0.0])),
            Err(RLError::Computation(_))
        ));
        assert_eq!(opt.steps(), 0);
    }

    #[test]
    fn test_kind_from_json() {
        let kind: OptimizerKind = serde_json::from_str(r#"{"kind": "sgd"}"#).unwrap();
        assert_eq!(kind, OptimizerKind::Sgd);
        let kind: OptimizerKind =
            serde_json::from_str(r#"{"kind": "adam", "beta1": 0.5, "beta2": 0.9, "eps": 1e-6}"#).unwrap();
        assert!(matches!(kind, OptimizerKind::Adam { beta1, .. } if beta1 == 0.5));
    }
}
