//! Environment wrappers

use ndarray::Array1;
use tracing::trace;

use pgkit_core::environment::TRUNCATED_KEY;
use pgkit_core::{Environment, Result, Space, SpaceValue, Step};

/// Time limit wrapper
///
/// Ends the episode after `max_steps` steps. A cut-off episode is reported
/// as `done` with `info["TimeLimit.truncated"] = true`.
#[derive(Debug, Clone)]
pub struct TimeLimit<E> {
    /// Inner environment
    pub env: E,
    /// Maximum steps
    pub max_steps: usize,
    /// Current step count
    pub steps: usize,
}

impl<E> TimeLimit<E> {
    /// Create a new time limit wrapper
    pub fn new(env: E, max_steps: usize) -> Self {
        Self {
            env,
            max_steps,
            steps: 0,
        }
    }

    /// Unwrap the inner environment
    pub fn into_inner(self) -> E {
        self.env
    }
}

impl<E> Environment for TimeLimit<E>
where
    E: Environment,
{
    fn observation_space(&self) -> Box<dyn Space> {
        self.env.observation_space()
    }

    fn action_space(&self) -> Box<dyn Space> {
        self.env.action_space()
    }

    fn reset(&mut self) -> Result<Array1<f64>> {
        self.steps = 0;
        self.env.reset()
    }

    fn step(&mut self, action: &SpaceValue) -> Result<Step> {
        self.steps += 1;
        let mut step = self.env.step(action)?;

        if self.steps >= self.max_steps && !step.done {
            trace!(steps = self.steps, "episode truncated by time limit");
            step.done = true;
            step.info.insert(TRUNCATED_KEY, true);
        }

        Ok(step)
    }

    fn seed(&mut self, seed: u64) {
        self.env.seed(seed);
    }

    fn max_episode_steps(&self) -> Option<usize> {
        Some(self.max_steps)
    }

    fn close(&mut self) -> Result<()> {
        self.env.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CartPoleConfig, CartPoleEnv};

    #[test]
    fn test_truncates_after_max_steps() {
        let mut env = TimeLimit::new(CartPoleEnv::new(CartPoleConfig::default()).unwrap(), 3);
        env.seed(0);
        assert_eq!(env.max_episode_steps(), Some(3));
        env.reset().unwrap();

        // Alternating pushes keep the pole up for a few steps
        let mut last = None;
        for a in [0, 1, 0] {
            last = Some(env.step(&SpaceValue::Discrete(a)).unwrap());
        }
        let last = last.unwrap();
        assert!(last.done);
        assert!(last.info.is_truncated());

        env.reset().unwrap();
        assert_eq!(env.steps, 0);
        assert!(!env.step(&SpaceValue::Discrete(1)).unwrap().done);
    }
}
