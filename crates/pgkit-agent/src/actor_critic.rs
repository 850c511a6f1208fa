//! Actor-critic over whole trajectories

use async_trait::async_trait;
use ndarray::ArrayView1;
use rand::RngCore;
use tracing::trace;

use pgkit_core::{PolicyOutput, Result, Trajectory};

use crate::agent::{maybe_standardize, Agent, AgentConfig, Checkpoint, LearnOutput, Learner, StepTarget};
use crate::policy::PolicyNetwork;

/// Policy gradient with a learned state-value baseline
///
/// `Q_t` is the discounted return, bootstrapped from `V` of the final
/// observation when the trajectory was cut off before the episode ended,
/// and standardized within the trajectory when `standardize` is set.
/// The policy is weighted by `A_t = Q_t - V(s_t)` and the critic regresses
/// `V(s_t)` onto the same `Q_t` with weight `value_coef`.
#[derive(Debug)]
pub struct ActorCriticAgent {
    learner: Learner,
}

impl ActorCriticAgent {
    /// Algorithm name recorded in checkpoints
    pub const ALGORITHM: &'static str = "actor_critic";

    /// Create an agent around a policy with a value head
    pub fn new(policy: Box<dyn PolicyNetwork>, config: AgentConfig) -> Result<Self> {
        let learner = Learner::new(policy, config)?;
        learner.require_value_head(Self::ALGORITHM)?;
        Ok(Self { learner })
    }

    /// Number of learning steps taken
    #[must_use]
    pub fn learn_steps(&self) -> usize {
        self.learner.learn_steps()
    }
}

#[async_trait]
impl Agent for ActorCriticAgent {
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
        let mut targets = Vec::with_capacity(batch.len());
        for trajectory in batch {
            let last_value = match trajectory.transitions.last() {
                Some(last) if !last.done => self
                    .learner
                    .values(std::iter::once(last.next_observation.view()))?[0],
                _ => 0.0,
            };
            let q = maybe_standardize(
                trajectory.bootstrapped_returns(config.gamma, last_value)?,
                config.standardize,
            )?;
            let v = self
                .learner
                .values(trajectory.transitions.iter().map(|t| t.observation.view()))?;
            let advantages = &q - &v;
            trace!(len = trajectory.len(), last_value, "actor-critic targets");
            targets.push((q, advantages));
        }

        let groups: Vec<Vec<StepTarget<'_>>> = batch
            .iter()
            .zip(&targets)
            .map(|(trajectory, (q, advantages))| {
                trajectory
                    .transitions
                    .iter()
                    .zip(q.iter().zip(advantages))
                    .map(|(transition, (&q, &advantage))| StepTarget {
                        observation: transition.observation.view(),
                        action: &transition.output.action,
                        advantage,
                        value_target: Some(q),
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
mod tests {
    use super::*;
    use crate::optim::OptimizerKind;
    use crate::reinforce::tests::{bandit_policy, pull};
    use crate::reinforce::ReinforceAgent;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;
    use pgkit_core::{RLError, SpaceValue, Transition};

    fn config() -> AgentConfig {
        AgentConfig {
            learning_rate: 0.05,
            standardize: false,
            value_coef: 1.0,
            entropy_coef: 0.0,
            max_grad_norm: None,
            optimizer: OptimizerKind::Sgd,
            ..AgentConfig::default()
        }
    }

    #[test]
    fn test_requires_value_head() {
        let err = ActorCriticAgent::new(bandit_policy(false), config()).unwrap_err();
        assert!(matches!(err, RLError::Agent(_)));
    }

    #[test]
    fn test_critic_learns_expected_return() {
        let mut agent = ActorCriticAgent::new(bandit_policy(true), config()).unwrap();
        // Both arms pulled equally often: the state is worth 0.5
        let batch = vec![pull(0), pull(1)];
        let first = agent.learn(&batch).unwrap();
        let mut last = first.clone();
        for _ in 0..200 {
            last = agent.learn(&batch).unwrap();
        }
        let mean_value_loss = |out: &LearnOutput| out.value_losses.iter().sum::<f64>() / 2.0;
        assert!(mean_value_loss(&last) < mean_value_loss(&first));
        assert!(last.loss < first.loss);

        let value = agent.value(arr1(&[1.0]).view()).unwrap().unwrap();
        assert_abs_diff_eq!(value, 0.5, epsilon = 0.05);
        assert_eq!(agent.learn_steps(), 201);
    }

    #[test]
    fn test_truncated_trajectory_bootstraps() {
        let mut agent = ActorCriticAgent::new(bandit_policy(true), config()).unwrap();
        // Value head is v . s + c with s = [1], so V = v + c
        let mut params = agent.policy().parameters();
        let n = params.len();
        params[n - 2] = 1.0;
        params[n - 1] = 1.0;
        agent.learner.policy.set_parameters(&params).unwrap();

        let mut trajectory = pull(0);
        trajectory.transitions[0].done = false;
        let out = agent.learn(&[trajectory]).unwrap();
        // Q = 1 + 0.99 * V(s') = 2.98, V(s) = 2
        assert_abs_diff_eq!(out.value_losses[0], (2.98 - 2.0_f64).powi(2), epsilon = 1e-12);
    }

    #[test]
    fn test_standardized_returns_are_critic_targets() {
        let mut agent = ActorCriticAgent::new(
            bandit_policy(true),
            AgentConfig {
                gamma: 0.5,
                standardize: true,
                ..config()
            },
        )
        .unwrap();
        let mut trajectory = Trajectory::new();
        for (i, reward) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            trajectory.push(Transition {
                observation: arr1(&[1.0]),
                output: PolicyOutput {
                    action: SpaceValue::Discrete(0),
                    log_prob: 0.5f64.ln(),
                    entropy: 2f64.ln(),
                    state_value: Some(0.0),
                },
                reward,
                next_observation: arr1(&[1.0]),
                done: i == 2,
            });
        }
        // Fresh value head is zero, so the loss is mean(std(Q)^2) = 1
        let out = agent.learn(&[trajectory]).unwrap();
        assert_abs_diff_eq!(out.value_losses[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_checkpoint_from_other_algorithm_is_rejected() {
        let path = std::env::temp_dir().join(format!("pgkit-ac-{}.json", std::process::id()));
        let reinforce = ReinforceAgent::new(bandit_policy(true), config()).unwrap();
        let mut agent = ActorCriticAgent::new(bandit_policy(true), config()).unwrap();
        tokio_test::block_on(async {
            reinforce.save(&path).await.unwrap();
            let err = agent.load(&path).await.unwrap_err();
            assert!(matches!(err, RLError::Agent(_)));
            tokio::fs::remove_file(&path).await.unwrap();
        });
    }

    #[test]
    fn test_missing_action_is_reported() {
        let mut agent = ActorCriticAgent::new(bandit_policy(true), config()).unwrap();
        let mut trajectory = Trajectory::new();
        trajectory.push(Transition {
            observation: arr1(&[1.0]),
            output: PolicyOutput {
                action: SpaceValue::Discrete(9),
                log_prob: 0.0,
                entropy: 0.0,
                state_value: Some(0.0),
            },
            reward: 1.0,
            next_observation: arr1(&[1.0]),
            done: true,
        });
        assert!(matches!(agent.learn(&[trajectory]), Err(RLError::InvalidAction(_))));
    }
}
