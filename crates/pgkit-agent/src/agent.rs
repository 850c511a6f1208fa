//! Agent trait, configuration and the shared policy-gradient update

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use ndarray::{Array1, ArrayView1};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pgkit_core::{PolicyOutput, RLError, Result, SpaceValue, Standardize, Transform};

use crate::optim::{Optimizer, OptimizerKind};
use crate::policy::{PolicyNetwork, StepCoefficients, ValueTarget};
use crate::schedule::{ConstantSchedule, ExponentialSchedule, LinearSchedule, Schedule};

/// Configuration shared by the policy-gradient agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Initial learning rate
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f64,
    /// Standardize returns (REINFORCE, actor-critic) or advantages (A2C)
    pub standardize: bool,
    /// Weight of the value loss
    pub value_coef: f64,
    /// Weight of the entropy loss
    pub entropy_coef: f64,
    /// Global gradient-norm clip
    pub max_grad_norm: Option<f64>,
    /// Decay the learning rate linearly to a tenth over this many updates
    pub lr_decay_steps: Option<usize>,
    /// Decay the learning rate geometrically by this factor per update, down to a tenth
    pub lr_decay_rate: Option<f64>,
    /// Update rule
    pub optimizer: OptimizerKind,
    /// Additional parameters
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 0.99,
            standardize: true,
            value_coef: 0.5,
            entropy_coef: 0.01,
            max_grad_norm: Some(0.5),
            lr_decay_steps: None,
            lr_decay_rate: None,
            optimizer: OptimizerKind::default(),
            params: serde_json::Map::new(),
        }
    }
}

impl AgentConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check every field against its domain
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(RLError::Value(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(RLError::Value(format!("gamma must lie in (0, 1], got {}", self.gamma)));
        }
        if !(self.value_coef >= 0.0 && self.entropy_coef >= 0.0) {
            return Err(RLError::Value(format!(
                "loss coefficients must be non-negative, got value_coef {} and entropy_coef {}",
                self.value_coef, self.entropy_coef
            )));
        }
        if let Some(norm) = self.max_grad_norm {
            if !(norm > 0.0) {
                return Err(RLError::Value(format!("max_grad_norm must be positive, got {norm}")));
            }
        }
        if self.lr_decay_steps == Some(0) {
            return Err(RLError::Value("lr_decay_steps must be positive".to_string()));
        }
        if let Some(rate) = self.lr_decay_rate {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(RLError::Value(format!("lr_decay_rate must lie in (0, 1], got {rate}")));
            }
            if self.lr_decay_steps.is_some() {
                return Err(RLError::Value(
                    "lr_decay_steps and lr_decay_rate are mutually exclusive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Learning-rate schedule described by this config
    #[must_use]
    pub fn schedule(&self) -> Box<dyn Schedule> {
        let floor = self.learning_rate * 0.1;
        match (self.lr_decay_steps, self.lr_decay_rate) {
            (Some(steps), _) => Box::new(LinearSchedule::new(self.learning_rate, floor, steps)),
            (None, Some(rate)) => Box::new(ExponentialSchedule::new(self.learning_rate, floor, rate)),
            (None, None) => Box::new(ConstantSchedule::new(self.learning_rate)),
        }
    }

    /// Optimizer described by this config
    #[must_use]
    pub fn build_optimizer(&self) -> Optimizer {
        Optimizer::new(self.optimizer, self.schedule()).with_max_grad_norm(self.max_grad_norm)
    }
}

/// Losses and settings of one learning step
///
/// Per-trajectory losses are means over time steps; `loss` is the mean of
/// `total_losses` over trajectories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnOutput {
    /// Mean total loss over trajectories
    pub loss: f64,
    /// Policy loss per trajectory
    pub policy_losses: Vec<f64>,
    /// Value loss per trajectory, empty without a critic
    pub value_losses: Vec<f64>,
    /// Entropy loss per trajectory
    pub entropy_losses: Vec<f64>,
    /// Weighted sum of the above per trajectory
    pub total_losses: Vec<f64>,
    /// Learning rate used for the update
    pub learning_rate: f64,
    /// Gradient norm before clipping
    pub grad_norm: f64,
}

/// Saved agent state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Algorithm that wrote the checkpoint
    pub algorithm: String,
    /// Agent configuration
    pub config: AgentConfig,
    /// Flattened policy parameters
    pub parameters: Vec<f64>,
    /// Number of learning steps taken
    pub learn_steps: usize,
}

/// Policy-gradient agent
#[async_trait]
pub trait Agent: Send + Sync {
    /// What one call to [`learn`](Self::learn) consumes
    type Batch: ?Sized + Sync;

    /// Algorithm name recorded in checkpoints
    fn algorithm(&self) -> &'static str;

    /// Sample an action for `observation`
    fn choose_action(&self, observation: ArrayView1<'_, f64>, rng: &mut dyn RngCore) -> Result<PolicyOutput>;

    /// State value of `observation`, if the policy has a value head
    fn value(&self, observation: ArrayView1<'_, f64>) -> Result<Option<f64>>;

    /// Take one gradient step on `batch`
    fn learn(&mut self, batch: &Self::Batch) -> Result<LearnOutput>;

    /// Agent configuration
    fn config(&self) -> &AgentConfig;

    /// The agent's policy
    fn policy(&self) -> &dyn PolicyNetwork;

    /// Snapshot of the learnable state
    fn checkpoint(&self) -> Checkpoint;

    /// Restore a snapshot taken by [`checkpoint`](Self::checkpoint)
    fn restore(&mut self, checkpoint: Checkpoint) -> Result<()>;

    /// Save the agent as JSON
    async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.checkpoint())?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing checkpoint {}", path.display()))?;
        info!(algorithm = self.algorithm(), path = %path.display(), "saved agent");
        Ok(())
    }

    /// Load an agent saved with [`save`](Self::save)
    async fn load(&mut self, path: &Path) -> Result<()> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading checkpoint {}", path.display()))?;
        let checkpoint: Checkpoint = serde_json::from_str(&json)?;
        if checkpoint.algorithm != self.algorithm() {
            return Err(RLError::Agent(format!(
                "checkpoint was written by {}, not {}",
                checkpoint.algorithm,
                self.algorithm()
            )));
        }
        self.restore(checkpoint)?;
        info!(algorithm = self.algorithm(), path = %path.display(), "loaded agent");
        Ok(())
    }
}

/// One time step of a learning batch
#[derive(Debug, Clone)]
pub(crate) struct StepTarget<'a> {
    pub observation: ArrayView1<'a, f64>,
    pub action: &'a SpaceValue,
    pub advantage: f64,
    pub value_target: Option<f64>,
}

/// Standardize `x` when `enabled`
pub(crate) fn maybe_standardize(x: Array1<f64>, enabled: bool) -> Result<Array1<f64>> {
    if enabled {
        Ok(Standardize::new().apply(x)?.into_array())
    } else {
        Ok(x)
    }
}

/// Policy, optimizer and bookkeeping shared by every agent
#[derive(Debug)]
pub(crate) struct Learner {
    pub policy: Box<dyn PolicyNetwork>,
    pub config: AgentConfig,
    optimizer: Optimizer,
    learn_steps: usize,
}

impl Learner {
    pub fn new(policy: Box<dyn PolicyNetwork>, config: AgentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            optimizer: config.build_optimizer(),
            policy,
            config,
            learn_steps: 0,
        })
    }

    pub fn require_value_head(&self, algorithm: &str) -> Result<()> {
        if self.policy.has_value_head() {
            Ok(())
        } else {
            Err(RLError::Agent(format!("{algorithm} needs a policy with a value head")))
        }
    }

    /// Value of every observation, failing without a value head
    pub fn values<'a>(&self, observations: impl Iterator<Item = ArrayView1<'a, f64>>) -> Result<Array1<f64>> {
        observations
            .map(|obs| {
                self.policy
                    .value(obs)?
                    .ok_or_else(|| RLError::Policy("policy has no value head".to_string()))
            })
            .collect()
    }

    /// Average the step losses over time, then over groups, and take one optimizer step
    pub fn update(&mut self, algorithm: &'static str, groups: &[Vec<StepTarget<'_>>]) -> Result<LearnOutput> {
        if groups.is_empty() || groups.iter().any(Vec::is_empty) {
            return Err(RLError::Value(format!("{algorithm} cannot learn from an empty batch")));
        }
        let with_critic = groups.iter().flatten().any(|step| step.value_target.is_some());

        #[allow(clippy::cast_precision_loss)]
        let num_groups = groups.len() as f64;
        let mut grad = Array1::zeros(self.policy.num_parameters());
        let mut output = LearnOutput::default();

        for group in groups {
            #[allow(clippy::cast_precision_loss)]
            let len = group.len() as f64;
            let scale = 1.0 / (len * num_groups);
            let (mut policy_loss, mut entropy_loss, mut value_loss) = (0.0, 0.0, 0.0);

            for step in group {
                let eval = self.policy.evaluate(step.observation, step.action)?;
                policy_loss -= eval.log_prob * step.advantage;
                entropy_loss -= eval.entropy;

                let value = match step.value_target {
                    Some(target) => {
                        let v = eval
                            .value
                            .ok_or_else(|| RLError::Policy("policy has no value head".to_string()))?;
                        value_loss += (v - target).powi(2);
                        Some(ValueTarget {
                            target,
                            weight: self.config.value_coef * scale,
                        })
                    }
                    None => None,
                };
                let coefficients = StepCoefficients {
                    advantage: step.advantage * scale,
                    entropy: self.config.entropy_coef * scale,
                    value,
                };
                grad += &self.policy.gradient(step.observation, step.action, &coefficients)?;
            }

            let (policy_loss, entropy_loss, value_loss) = (policy_loss / len, entropy_loss / len, value_loss / len);
            let mut total = policy_loss + self.config.entropy_coef * entropy_loss;
            output.policy_losses.push(policy_loss);
            output.entropy_losses.push(entropy_loss);
            if with_critic {
                total += self.config.value_coef * value_loss;
                output.value_losses.push(value_loss);
            }
            output.total_losses.push(total);
        }
        output.loss = output.total_losses.iter().sum::<f64>() / num_groups;

        let mut params = self.policy.parameters();
        let step = self.optimizer.step(&mut params, grad)?;
        self.policy.set_parameters(&params)?;
        self.learn_steps += 1;

        output.learning_rate = step.learning_rate;
        output.grad_norm = step.grad_norm;

        metrics::gauge!("pgkit.agent.loss", output.loss);
        metrics::gauge!("pgkit.agent.learning_rate", output.learning_rate);
        metrics::counter!("pgkit.agent.learn_steps", 1);
        debug!(
            algorithm,
            step = self.learn_steps,
            loss = output.loss,
            grad_norm = output.grad_norm,
            learning_rate = output.learning_rate,
            "learning step"
        );
        Ok(output)
    }

    pub fn choose_action(&self, observation: ArrayView1<'_, f64>, rng: &mut dyn RngCore) -> Result<PolicyOutput> {
        self.policy.act(observation, rng)
    }

    pub fn checkpoint(&self, algorithm: &str) -> Checkpoint {
        Checkpoint {
            algorithm: algorithm.to_string(),
            config: self.config.clone(),
            parameters: self.policy.parameters().to_vec(),
            learn_steps: self.learn_steps,
        }
    }

    /// Replace config and parameters; optimizer moments start afresh
    pub fn restore(&mut self, checkpoint: Checkpoint) -> Result<()> {
        checkpoint.config.validate()?;
        self.policy.set_parameters(&Array1::from(checkpoint.parameters))?;
        self.optimizer = checkpoint.config.build_optimizer();
        self.config = checkpoint.config;
        self.learn_steps = checkpoint.learn_steps;
        Ok(())
    }

    pub fn learn_steps(&self) -> usize {
        self.learn_steps
    }
}
