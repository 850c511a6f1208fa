//! Environment traits and types

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{Result, Space, SpaceValue};

/// Info key set by wrappers that cut an episode short
pub const TRUNCATED_KEY: &str = "TimeLimit.truncated";

/// Info key under which vectorized environments store the last observation of a finished episode
pub const TERMINAL_OBSERVATION_KEY: &str = "terminal_observation";

/// Result of a single environment step
#[derive(Debug, Clone)]
pub struct Step {
    /// Observation after the action
    pub observation: Array1<f64>,
    /// Reward signal
    pub reward: f64,
    /// Whether the episode is done
    pub done: bool,
    /// Additional info from the environment
    pub info: StepInfo,
}

/// Additional information from a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Custom fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StepInfo {
    /// Set a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Look up a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// Whether a time limit ended the episode
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.get(TRUNCATED_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Last observation of an episode that a vectorized environment auto-reset
    #[must_use]
    pub fn terminal_observation(&self) -> Option<Array1<f64>> {
        self.get(TERMINAL_OBSERVATION_KEY)
            .and_then(serde_json::Value::as_array)
            .map(|values| values.iter().filter_map(serde_json::Value::as_f64).collect())
    }
}

/// Configuration shared by environments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Random seed
    pub seed: Option<u64>,
    /// Maximum episode steps
    pub max_steps: Option<usize>,
    /// Additional parameters
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// A single, sequential environment
pub trait Environment: Send {
    /// Space of observations
    fn observation_space(&self) -> Box<dyn Space>;

    /// Space of actions
    fn action_space(&self) -> Box<dyn Space>;

    /// Start a new episode and return its first observation
    fn reset(&mut self) -> Result<Array1<f64>>;

    /// Advance one time step
    fn step(&mut self, action: &SpaceValue) -> Result<Step>;

    /// Reseed the environment's random number generator
    fn seed(&mut self, seed: u64);

    /// Horizon, if the environment has one
    fn max_episode_steps(&self) -> Option<usize> {
        None
    }

    /// Release resources
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn observation_space(&self) -> Box<dyn Space> {
        (**self).observation_space()
    }

    fn action_space(&self) -> Box<dyn Space> {
        (**self).action_space()
    }

    fn reset(&mut self) -> Result<Array1<f64>> {
        (**self).reset()
    }

    fn step(&mut self, action: &SpaceValue) -> Result<Step> {
        (**self).step(action)
    }

    fn seed(&mut self, seed: u64) {
        (**self).seed(seed);
    }

    fn max_episode_steps(&self) -> Option<usize> {
        (**self).max_episode_steps()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Batched result of stepping every sub-environment once
#[derive(Debug, Clone)]
pub struct VecStep {
    /// One observation per row
    pub observations: Array2<f64>,
    /// One reward per sub-environment
    pub rewards: Array1<f64>,
    /// One done flag per sub-environment
    pub dones: Vec<bool>,
    /// One info per sub-environment
    pub infos: Vec<StepInfo>,
}

/// A fixed number of environments stepped in lockstep
pub trait VecEnv: Send {
    /// Number of sub-environments
    fn num_env(&self) -> usize;

    /// Space of a single observation
    fn observation_space(&self) -> Box<dyn Space>;

    /// Space of a single action
    fn action_space(&self) -> Box<dyn Space>;

    /// Reset every sub-environment
    fn reset(&mut self) -> Result<Array2<f64>>;

    /// Step every sub-environment with one action each
    fn step(&mut self, actions: &[SpaceValue]) -> Result<VecStep>;

    /// Release resources
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<V: VecEnv + ?Sized> VecEnv for Box<V> {
    fn num_env(&self) -> usize {
        (**self).num_env()
    }

    fn observation_space(&self) -> Box<dyn Space> {
        (**self).observation_space()
    }

    fn action_space(&self) -> Box<dyn Space> {
        (**self).action_space()
    }

    fn reset(&mut self) -> Result<Array2<f64>> {
        (**self).reset()
    }

    fn step(&mut self, actions: &[SpaceValue]) -> Result<VecStep> {
        (**self).step(actions)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_step_info_fields() {
        let mut info = StepInfo::default();
        assert!(!info.is_truncated());
        info.insert(TRUNCATED_KEY, true);
        info.insert(TERMINAL_OBSERVATION_KEY, vec![0.5, -1.0]);
        assert!(info.is_truncated());
        assert_eq!(info.terminal_observation(), Some(arr1(&[0.5, -1.0])));
    }

    #[test]
    fn test_config_flattens_params() {
        let config: EnvironmentConfig =
            serde_json::from_str(r#"{"seed": 3, "max_steps": 200, "size": 5}"#).unwrap();
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.max_steps, Some(200));
        assert_eq!(config.params["size"], 5);
    }
}
