//! Running standardization of vectorized observations and rewards

use std::path::Path;

use ndarray::{Array1, Array2, Ix1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use pgkit_core::{RLError, Result, RunningMeanStd, Space, SpaceValue, VecEnv, VecStep};

/// Settings of a [`StandardizeVecEnv`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardizeConfig {
    /// Standardize observations with their running mean and std
    pub use_obs: bool,
    /// Scale rewards by the running std of the discounted returns
    pub use_reward: bool,
    /// Standardized observations are clipped to `[-clip_obs, clip_obs]`
    pub clip_obs: f64,
    /// Scaled rewards are clipped to `[-clip_reward, clip_reward]`
    pub clip_reward: f64,
    /// Discount of the return stream; must lie in `[0, 1)`
    pub gamma: f64,
    /// Added to the running std before dividing
    pub eps: f64,
}

impl Default for StandardizeConfig {
    fn default() -> Self {
        Self {
            use_obs: true,
            use_reward: true,
            clip_obs: 10.0,
            clip_reward: 10.0,
            gamma: 0.99,
            eps: 1e-8,
        }
    }
}

impl StandardizeConfig {
    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.gamma) {
            return Err(RLError::Value(format!(
                "gamma must lie in [0, 1) for reward standardization, got {}",
                self.gamma
            )));
        }
        if !(self.eps >= 0.0 && self.clip_obs > 0.0 && self.clip_reward > 0.0) {
            return Err(RLError::Value(
                "eps must be non-negative and clip ranges positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Standardizes the observations and scales the rewards of a vectorized environment
///
/// Observations are fed into one [`RunningMeanStd`] and returned as
/// `clip((obs - mean) / (std + eps), ±clip_obs)`. Rewards are accumulated
/// into a per-environment discounted return `R <- r + gamma * R`, whose
/// running std scales them: `clip(r / (std + eps), ±clip_reward)`. Rewards
/// are never re-centered. The return accumulator survives `reset()`; with
/// `gamma < 1` its statistics converge regardless.
#[derive(Debug)]
pub struct StandardizeVecEnv<V> {
    venv: V,
    config: StandardizeConfig,
    obs_rms: RunningMeanStd,
    reward_rms: RunningMeanStd,
    all_returns: Array1<f64>,
}

impl<V: VecEnv> StandardizeVecEnv<V> {
    /// Wrap `venv`; fails if `gamma` is not in `[0, 1)`
    pub fn new(venv: V, config: StandardizeConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            num_env = venv.num_env(),
            use_obs = config.use_obs,
            use_reward = config.use_reward,
            gamma = config.gamma,
            "created standardizing vectorized environment"
        );
        let all_returns = Array1::zeros(venv.num_env());
        Ok(Self {
            venv,
            config,
            obs_rms: RunningMeanStd::new(),
            reward_rms: RunningMeanStd::new(),
            all_returns,
        })
    }

    /// Running statistics of the observations
    #[must_use]
    pub fn obs_running_stats(&self) -> &RunningMeanStd {
        &self.obs_rms
    }

    /// Running statistics of the discounted returns
    #[must_use]
    pub fn reward_running_stats(&self) -> &RunningMeanStd {
        &self.reward_rms
    }

    /// Current discounted return of each sub-environment
    #[must_use]
    pub fn all_returns(&self) -> &Array1<f64> {
        &self.all_returns
    }

    /// Settings
    #[must_use]
    pub fn config(&self) -> &StandardizeConfig {
        &self.config
    }

    /// The wrapped environment
    #[must_use]
    pub fn inner(&self) -> &V {
        &self.venv
    }

    fn process_obs(&mut self, obs: Array2<f64>) -> Result<Array2<f64>> {
        if !self.config.use_obs {
            return Ok(obs);
        }
        self.obs_rms.update(&obs)?;
        let (mean, var) = self
            .obs_rms
            .moments()
            .ok_or_else(|| RLError::Computation("observation statistics are empty".to_string()))?;
        let mean = feature_vector(mean)?;
        let std = feature_vector(var)?.mapv(f64::sqrt);

        let (eps, clip) = (self.config.eps, self.config.clip_obs);
        Ok(((obs - &mean) / &(std + eps)).mapv(|v| v.clamp(-clip, clip)))
    }

    fn process_reward(&mut self, rewards: Array1<f64>) -> Result<Array1<f64>> {
        if !self.config.use_reward {
            return Ok(rewards);
        }
        self.all_returns = &rewards + &(&self.all_returns * self.config.gamma);
        self.reward_rms.update(&self.all_returns)?;
        let (_, var) = self
            .reward_rms
            .moments()
            .ok_or_else(|| RLError::Computation("reward statistics are empty".to_string()))?;
        let std = var.iter().next().copied().unwrap_or(0.0).sqrt();

        let (eps, clip) = (self.config.eps, self.config.clip_reward);
        Ok(rewards.mapv(|r| (r / (std + eps)).clamp(-clip, clip)))
    }
}

fn feature_vector(a: &ndarray::ArrayD<f64>) -> Result<Array1<f64>> {
    a.view()
        .into_dimensionality::<Ix1>()
        .map(|v| v.to_owned())
        .map_err(|e| RLError::Shape(format!("expected flat observations: {e}")))
}

impl<V: VecEnv> VecEnv for StandardizeVecEnv<V> {
    fn num_env(&self) -> usize {
        self.venv.num_env()
    }

    fn observation_space(&self) -> Box<dyn Space> {
        self.venv.observation_space()
    }

    fn action_space(&self) -> Box<dyn Space> {
        self.venv.action_space()
    }

    fn reset(&mut self) -> Result<Array2<f64>> {
        let obs = self.venv.reset()?;
        self.process_obs(obs)
    }

    fn step(&mut self, actions: &[SpaceValue]) -> Result<VecStep> {
        let step = self.venv.step(actions)?;
        Ok(VecStep {
            observations: self.process_obs(step.observations)?,
            rewards: self.process_reward(step.rewards)?,
            dones: step.dones,
            infos: step.infos,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.venv.close()
    }
}
