//! Advantage actor-critic over fixed-length segments

use async_trait::async_trait;
use ndarray::{Array1, Array2, ArrayView1};
use rand::RngCore;

use pgkit_core::{PolicyOutput, RLError, Result, Segment};

use crate::agent::{maybe_standardize, Agent, AgentConfig, Checkpoint, LearnOutput, Learner, StepTarget};
use crate::policy::PolicyNetwork;

/// Synchronous advantage actor-critic
///
/// Each segment holds `T` steps from `N` environments. Returns are n-step
/// bootstrapped from the segment's `last_values` and never cross an episode
/// boundary. Every environment column is one trajectory for loss averaging.
#[derive(Debug)]
pub struct A2CAgent {
    learner: Learner,
}

impl A2CAgent {
    /// Algorithm name recorded in checkpoints
    pub const ALGORITHM: &'static str = "a2c";

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

    /// Returns and advantages of one segment, both `(T, N)`
    fn targets(&self, segment: &Segment) -> Result<(Array2<f64>, Array2<f64>)> {
        segment.validate()?;
        let config = &self.learner.config;
        let returns = segment.bootstrapped_returns(config.gamma)?;

        let (t_len, n_env) = returns.dim();
        let values = self
            .learner
            .values(segment.observations.iter().flat_map(|obs| obs.rows()))?;
        let advantages: Array1<f64> = returns.iter().zip(&values).map(|(r, v)| r - v).collect();
        let advantages = maybe_standardize(advantages, config.standardize)?
            .into_shape((t_len, n_env))
            .map_err(|e| RLError::Shape(format!("cannot reshape advantages: {e}")))?;
        Ok((returns, advantages))
    }
}

#[async_trait]
impl Agent for A2CAgent {
    type Batch = [Segment];

    fn algorithm(&self) -> &'static str {
        Self::ALGORITHM
    }

    fn choose_action(&self, observation: ArrayView1<'_, f64>, rng: &mut dyn RngCore) -> Result<PolicyOutput> {
        self.learner.choose_action(observation, rng)
    }

    fn value(&self, observation: ArrayView1<'_, f64>) -> Result<Option<f64>> {
        self.learner.policy.value(observation)
    }

    fn learn(&mut self, batch: &[Segment]) -> Result<LearnOutput> {
        let targets = batch
            .iter()
            .map(|segment| self.targets(segment))
            .collect::<Result<Vec<_>>>()?;

        let mut groups: Vec<Vec<StepTarget<'_>>> = Vec::new();
        for (segment, (returns, advantages)) in batch.iter().zip(&targets) {
            for n in 0..segment.num_env() {
                groups.push(
                    (0..segment.len())
                        .map(|t| StepTarget {
                            observation: segment.observations[t].row(n),
                            action: &segment.outputs[t][n].action,
                            advantage: advantages[[t, n]],
                            value_target: Some(returns[[t, n]]),
                        })
                        .collect(),
                );
            }
        }

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
    use crate::reinforce::tests::bandit_policy;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};
    use pgkit_core::SpaceValue;

    fn assert_close(actual: &Array2<f64>, expected: &Array2<f64>) {
        assert_eq!(actual.dim(), expected.dim());
        for (a, e) in actual.iter().zip(expected) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-12);
        }
    }

    fn config() -> AgentConfig {
        AgentConfig {
            learning_rate: 0.05,
            gamma: 0.5,
            standardize: false,
            value_coef: 1.0,
            entropy_coef: 0.0,
            max_grad_norm: None,
            optimizer: OptimizerKind::Sgd,
            ..AgentConfig::default()
        }
    }

    fn output(arm: usize) -> PolicyOutput {
        PolicyOutput {
            action: SpaceValue::Discrete(arm),
            log_prob: 0.5f64.ln(),
            entropy: 2f64.ln(),
            state_value: Some(0.0),
        }
    }

    /// Three steps from two environments; env 0 finishes an episode at step 1
    fn segment() -> Segment {
        Segment {
            observations: vec![arr2(&[[1.0], [1.0]]); 3],
            outputs: vec![vec![output(0), output(1)]; 3],
            rewards: arr2(&[[1.0, 0.0], [1.0, 0.0], [1.0, 0.0]]),
            dones: vec![vec![false, false], vec![true, false], vec![false, false]],
            last_values: arr1(&[4.0, 4.0]),
        }
    }

    #[test]
    fn test_bootstrapped_targets() {
        let agent = A2CAgent::new(bandit_policy(true), config()).unwrap();
        let (returns, advantages) = agent.targets(&segment()).unwrap();
        // env 0: [1 + 0.5 * 1, 1, 1 + 0.5 * 4]; env 1: [0.5, 1, 2]
        assert_close(&returns, &arr2(&[[1.5, 0.5], [1.0, 1.0], [3.0, 2.0]]));
        // Value head starts at zero
        assert_close(&advantages, &returns);
    }

    #[test]
    fn test_standardized_advantages() {
        let agent = A2CAgent::new(
            bandit_policy(true),
            AgentConfig {
                standardize: true,
                ..config()
            },
        )
        .unwrap();
        let (_, advantages) = agent.targets(&segment()).unwrap();
        assert_abs_diff_eq!(advantages.mean().unwrap(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(advantages.std(0.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_learning_reduces_value_loss() {
        let mut agent = A2CAgent::new(bandit_policy(true), config()).unwrap();
        let batch = [segment()];
        let first = agent.learn(&batch).unwrap();
        assert_eq!(first.total_losses.len(), 2);
        let mut last = first.clone();
        for _ in 0..100 {
            last = agent.learn(&batch).unwrap();
        }
        let total = |out: &LearnOutput| out.value_losses.iter().sum::<f64>();
        assert!(total(&last) < total(&first));
        assert_eq!(agent.learn_steps(), 101);
    }

    #[test]
    fn test_malformed_segment() {
        let mut agent = A2CAgent::new(bandit_policy(true), config()).unwrap();
        let mut bad = segment();
        bad.outputs.pop();
        assert!(matches!(agent.learn(&[bad]), Err(RLError::Length { expected: 3, actual: 2 })));

        let mut bad = segment();
        bad.last_values = arr1(&[0.0]);
        assert!(matches!(agent.learn(&[bad]), Err(RLError::Length { expected: 2, actual: 1 })));
    }
}
