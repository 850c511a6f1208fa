//! REINFORCE: Monte-Carlo policy gradient

use async_trait::async_trait;
use ndarray::ArrayView1;
use rand::RngCore;

use pgkit_core::{PolicyOutput, Result, Trajectory};

use crate::agent::{maybe_standardize, Agent, AgentConfig, Checkpoint, LearnOutput, Learner, StepTarget};
use crate::policy::PolicyNetwork;

/// Vanilla policy gradient weighted by discounted returns
///
/// Per trajectory the loss is `mean(-log pi(a_t|s_t) * Q_t)` plus
/// `entropy_coef * mean(-H_t)`, where `Q_t` is the discounted return from
/// step `t`, optionally standardized within the trajectory.
#[derive(Debug)]
pub struct ReinforceAgent {
    learner: Learner,
}

impl ReinforceAgent {
    /// Algorithm name recorded in checkpoints
    pub const ALGORITHM: &'static str = "reinforce";

    /// Create an agent around `policy`
    pub fn new(policy: Box<dyn PolicyNetwork>, config: AgentConfig) -> Result<Self> {
        Ok(Self {
            learner: Learner::new(policy, config)?,
        })
    }

    /// Number of learning steps taken
    #[must_use]
    pub fn learn_steps(&self) -> usize {
        self.learner.learn_steps()
    }
}

#[async_trait]
impl Agent for ReinforceAgent {
    type Batch = [Trajectory];

    fn algorithm(&self) -> &'static str {
        Self::ALGORITHM
    }

    fn choose_action(&self, observation: ArrayView1<'_, f64>, rng: &mut dyn RngCore) -> Result<PolicyOutput> {
        self.learner.choose_action(observation, rng)
    }

    fn value(&self, observation: ArrayView1<'_, f64>) -> Result<Option<f64>> {
        self.learner.policy.value(observation)
    }

    fn learn(&mut self, batch: &[Trajectory]) -> Result<LearnOutput> {
        let config = &self.learner.config;
        let mut returns = Vec::with_capacity(batch.len());
        for trajectory in batch {
            let q = trajectory.all_discounted_returns(config.gamma)?;
            returns.push(maybe_standardize(q, config.standardize)?);
        }

        let groups: Vec<Vec<StepTarget<'_>>> = batch
            .iter()
            .zip(&returns)
            .map(|(trajectory, q)| {
                trajectory
                    .transitions
                    .iter()
                    .zip(q)
                    .map(|(transition, &q)| StepTarget {
                        observation: transition.observation.view(),
                        action: &transition.output.action,
                        advantage: q,
                        value_target: None,
                    })
                    .collect()
            })
            .collect();

        self.learner.update(Self::ALGORITHM, &groups)
    }

    fn config(&self) -> &AgentConfig {
        &self.learner.config
    }

    fn policy(&self) -> &dyn PolicyNetwork {
        self.learner.policy.as_ref()
    }

    fn checkpoint(&self) -> Checkpoint {
        self.learner.checkpoint(Self::ALGORITHM)
    }

    fn restore(&mut self, checkpoint: Checkpoint) -> Result<()> {
        self.learner.restore(checkpoint)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::optim::OptimizerKind;
    use crate::policy::{LinearPolicyConfig, LinearSoftmaxPolicy};
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;
    use pgkit_core::{RLError, SpaceValue, Transition};

    pub(crate) fn bandit_policy(use_value_head: bool) -> Box<dyn PolicyNetwork> {
        Box::new(
            LinearSoftmaxPolicy::new(LinearPolicyConfig {
                obs_dim: 1,
                num_actions: 2,
                use_value_head,
                init_scale: 0.01,
                seed: Some(5),
            })
            .unwrap(),
        )
    }

    /// One-step episode of a two-armed bandit where arm 0 pays 1 and arm 1 pays 0
    pub(crate) fn pull(arm: usize) -> Trajectory {
        let mut trajectory = Trajectory::new();
        trajectory.push(Transition {
            observation: arr1(&[1.0]),
            output: PolicyOutput {
                action: SpaceValue::Discrete(arm),
                log_prob: 0.5f64.ln(),
                entropy: 2f64.ln(),
                state_value: None,
            },
            reward: if arm == 0 { 1.0 } else { 0.0 },
            next_observation: arr1(&[1.0]),
            done: true,
        });
        trajectory
    }

    fn config() -> AgentConfig {
        AgentConfig {
            learning_rate: 0.1,
            standardize: false,
            entropy_coef: 0.0,
            max_grad_norm: None,
            optimizer: OptimizerKind::Sgd,
            ..AgentConfig::default()
        }
    }

    #[test]
    fn test_loss_decreases_on_bandit() {
        let mut agent = ReinforceAgent::new(bandit_policy(false), config()).unwrap();
        let batch = vec![pull(0), pull(1)];
        let first = agent.learn(&batch).unwrap();
        let mut last = first.clone();
        for _ in 0..100 {
            last = agent.learn(&batch).unwrap();
        }
        assert!(last.loss < first.loss, "{} !< {}", last.loss, first.loss);
        assert!(first.value_losses.is_empty());
        assert_eq!(agent.learn_steps(), 101);

        let p0 = agent
            .policy()
            .evaluate(arr1(&[1.0]).view(), &SpaceValue::Discrete(0))
            .unwrap()
            .log_prob
            .exp();
        assert!(p0 > 0.8, "paying arm has probability {p0}");
    }

    #[test]
    fn test_losses_use_discounted_returns() {
        let mut agent = ReinforceAgent::new(bandit_policy(false), config()).unwrap();
        let mut trajectory = Trajectory::new();
        for (reward, done) in [(1.0, false), (2.0, true)] {
            trajectory.push(Transition {
                observation: arr1(&[1.0]),
                output: PolicyOutput {
                    action: SpaceValue::Discrete(0),
                    log_prob: 0.0,
                    entropy: 0.0,
                    state_value: None,
                },
                reward,
                next_observation: arr1(&[1.0]),
                done,
            });
        }
        let log_prob = agent
            .policy()
            .evaluate(arr1(&[1.0]).view(), &SpaceValue::Discrete(0))
            .unwrap()
            .log_prob;
        let out = agent.learn(&[trajectory]).unwrap();
        // Q = [1 + 0.99 * 2, 2]
        assert_abs_diff_eq!(out.policy_losses[0], -log_prob * (2.98 + 2.0) / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.loss, out.total_losses[0]);
        assert_abs_diff_eq!(out.learning_rate, 0.1);
    }

    #[test]
    fn test_empty_batch() {
        let mut agent = ReinforceAgent::new(bandit_policy(false), config()).unwrap();
        assert!(matches!(agent.learn(&[]), Err(RLError::Value(_))));
        assert!(matches!(agent.learn(&[Trajectory::new()]), Err(RLError::Value(_))));
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let path = std::env::temp_dir().join(format!("pgkit-reinforce-{}.json", std::process::id()));
        let mut agent = ReinforceAgent::new(bandit_policy(false), config()).unwrap();
        agent.learn(&[pull(0)]).unwrap();
        agent.save(&path).await.unwrap();

        let mut restored = ReinforceAgent::new(bandit_policy(false), AgentConfig::default()).unwrap();
        assert_ne!(restored.policy().parameters(), agent.policy().parameters());
        restored.load(&path).await.unwrap();
        assert_eq!(restored.policy().parameters(), agent.policy().parameters());
        assert_eq!(restored.config(), agent.config());
        assert_eq!(restored.learn_steps(), 1);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let mut agent = ReinforceAgent::new(bandit_policy(false), config()).unwrap();
        let result = tokio_test::block_on(agent.load(std::path::Path::new("/nonexistent/pgkit.json")));
        assert!(matches!(result, Err(RLError::Other(_))));
    }
}
