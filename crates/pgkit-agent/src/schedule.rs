//! Step-indexed schedules for learning-rate decay

use std::fmt::Debug;

/// A value that changes with the number of optimizer steps taken
pub trait Schedule: Debug + Send + Sync {
    /// Value at step `t`
    fn value(&self, t: usize) -> f64;
}

/// Linear interpolation from `start` to `end` over `steps`, then constant
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSchedule {
    /// Starting value
    pub start: f64,
    /// Ending value
    pub end: f64,
    /// Number of steps for decay
    pub steps: usize,
}

impl LinearSchedule {
    /// Create a new linear schedule
    #[must_use]
    pub fn new(start: f64, end: f64, steps: usize) -> Self {
        Self { start, end, steps }
    }
}

impl Schedule for LinearSchedule {
    #[allow(clippy::cast_precision_loss)]
    fn value(&self, t: usize) -> f64 {
        if t >= self.steps {
            self.end
        } else {
            let progress = t as f64 / self.steps as f64;
            self.start + (self.end - self.start) * progress
        }
    }
}

/// Geometric decay `start * decay_rate^t`, floored at `min_value`
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialSchedule {
    /// Starting value
    pub start: f64,
    /// Minimum value
    pub min_value: f64,
    /// Decay rate
    pub decay_rate: f64,
}

impl ExponentialSchedule {
    /// Create a new exponential schedule
    #[must_use]
    pub fn new(start: f64, min_value: f64, decay_rate: f64) -> Self {
        Self {
            start,
            min_value,
            decay_rate,
        }
    }
}

impl Schedule for ExponentialSchedule {
    #[allow(clippy::cast_precision_loss)]
    fn value(&self, t: usize) -> f64 {
        (self.start * self.decay_rate.powf(t as f64)).max(self.min_value)
    }
}

/// Constant schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantSchedule {
    /// Constant value
    pub value: f64,
}

impl ConstantSchedule {
    /// Create a new constant schedule
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Schedule for ConstantSchedule {
    fn value(&self, _t: usize) -> f64 {
        self.value
    }
}
