//! Trajectory and segment storage

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ExpFactorCumSum, Mask, RLError, Result, SpaceValue};

/// What a policy produced when it chose an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOutput {
    /// Chosen action
    pub action: SpaceValue,
    /// Log-probability of the chosen action
    pub log_prob: f64,
    /// Entropy of the action distribution
    pub entropy: f64,
    /// State-value estimate, if the policy has a value head
    pub state_value: Option<f64>,
}

/// Single transition in a trajectory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Observation the action was chosen from
    pub observation: Array1<f64>,
    /// Policy output for this step
    pub output: PolicyOutput,
    /// Reward received
    pub reward: f64,
    /// Observation after the action
    pub next_observation: Array1<f64>,
    /// Whether the episode ended
    pub done: bool,
}

/// Transitions of one episode, in order
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Episode ID
    pub id: Uuid,
    /// When collection started
    pub started_at: DateTime<Utc>,
    /// Sequence of transitions
    pub transitions: Vec<Transition>,
    /// Sum of rewards
    pub total_reward: f64,
}

impl Default for Trajectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Trajectory {
    /// Create a new empty trajectory
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            transitions: Vec::new(),
            total_reward: 0.0,
        }
    }

    /// Append a transition
    pub fn push(&mut self, transition: Transition) {
        self.total_reward += transition.reward;
        self.transitions.push(transition);
    }

    /// Number of transitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if trajectory is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Whether the episode reached a terminal state
    #[must_use]
    pub fn completed(&self) -> bool {
        self.transitions.last().is_some_and(|t| t.done)
    }

    /// Rewards in order
    #[must_use]
    pub fn rewards(&self) -> Array1<f64> {
        self.transitions.iter().map(|t| t.reward).collect()
    }

    /// Done flags in order
    #[must_use]
    pub fn dones(&self) -> Vec<bool> {
        self.transitions.iter().map(|t| t.done).collect()
    }

    /// Continuation mask built from the done flags
    #[must_use]
    pub fn masks(&self) -> Mask {
        Mask::from_dones(&self.dones())
    }

    /// Log-probabilities of the taken actions
    #[must_use]
    pub fn log_probs(&self) -> Array1<f64> {
        self.transitions.iter().map(|t| t.output.log_prob).collect()
    }

    /// Entropies of the action distributions
    #[must_use]
    pub fn entropies(&self) -> Array1<f64> {
        self.transitions.iter().map(|t| t.output.entropy).collect()
    }

    /// State-value estimates; fails if any step lacks one
    pub fn values(&self) -> Result<Array1<f64>> {
        self.transitions
            .iter()
            .enumerate()
            .map(|(t, tr)| {
                tr.output.state_value.ok_or_else(|| {
                    RLError::Policy(format!("no state value recorded at step {t}"))
                })
            })
            .collect()
    }

    /// Discounted return from every time step to the end of the episode
    pub fn all_discounted_returns(&self, gamma: f64) -> Result<Array1<f64>> {
        ExpFactorCumSum::new(gamma)?.apply_masked(self.rewards(), self.masks())
    }

    /// Discounted returns seeded with `last_value` when the episode was cut off
    ///
    /// A completed episode bootstraps from zero.
    pub fn bootstrapped_returns(&self, gamma: f64, last_value: f64) -> Result<Array1<f64>> {
        let bootstrap = if self.completed() { 0.0 } else { last_value };
        bootstrapped(&self.rewards(), &self.dones(), gamma, bootstrap)
    }
}

/// Discounted returns over `rewards` followed by a bootstrap value
///
/// The bootstrap is appended to the reward sequence before the masked
/// cumulative sum and stripped afterwards, so a terminal final step never
/// sees it.
pub fn bootstrapped(rewards: &Array1<f64>, dones: &[bool], gamma: f64, bootstrap: f64) -> Result<Array1<f64>> {
    if rewards.len() != dones.len() {
        return Err(RLError::Length {
            expected: rewards.len(),
            actual: dones.len(),
        });
    }
    let mut extended = rewards.to_vec();
    extended.push(bootstrap);
    let mut mask = Mask::from_dones(dones);
    mask.push(false);

    let returns = ExpFactorCumSum::new(gamma)?.apply_masked(extended, mask)?;
    Ok(returns.slice(ndarray::s![..rewards.len()]).to_owned())
}

/// A fixed-length rollout of `T` steps from `N` environments
///
/// Row `t` of each array holds time step `t` for every environment.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Observations, one `(N, obs_dim)` array per step
    pub observations: Vec<Array2<f64>>,
    /// Policy outputs, `N` per step
    pub outputs: Vec<Vec<PolicyOutput>>,
    /// Rewards, shape `(T, N)`
    pub rewards: Array2<f64>,
    /// Done flags, `T` rows of `N`
    pub dones: Vec<Vec<bool>>,
    /// Value of the observation after the last step, one per environment
    pub last_values: Array1<f64>,
}

impl Segment {
    /// Number of time steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.rewards.nrows()
    }

    /// Whether the segment has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of environments
    #[must_use]
    pub fn num_env(&self) -> usize {
        self.rewards.ncols()
    }

    /// Done flags of environment `n`
    ///
    /// A step row without an entry for `n` is a [`RLError::Length`] error.
    pub fn dones_for(&self, n: usize) -> Result<Vec<bool>> {
        self.dones
            .iter()
            .map(|row| {
                row.get(n).copied().ok_or(RLError::Length {
                    expected: self.num_env(),
                    actual: row.len(),
                })
            })
            .collect()
    }

    /// Check that every field agrees with the `(T, N)` shape of `rewards`
    pub fn validate(&self) -> Result<()> {
        let (t_len, n_env) = self.rewards.dim();
        for len in [self.observations.len(), self.outputs.len(), self.dones.len()] {
            check_len(t_len, len)?;
        }
        let widths = self
            .observations
            .iter()
            .map(Array2::nrows)
            .chain(self.outputs.iter().map(Vec::len));
        for width in widths {
            check_len(n_env, width)?;
        }
        self.check_return_inputs()
    }

    fn check_return_inputs(&self) -> Result<()> {
        let (t_len, n_env) = self.rewards.dim();
        check_len(t_len, self.dones.len())?;
        for width in self.dones.iter().map(Vec::len) {
            check_len(n_env, width)?;
        }
        check_len(n_env, self.last_values.len())
    }

    /// Bootstrapped n-step returns, shape `(T, N)`
    ///
    /// `R_t = r_t + gamma * mask_t * R_{t+1}` per environment, seeded with
    /// the value of the last observation. Done flags or bootstrap values
    /// that do not match `rewards` are a [`RLError::Length`] error.
    pub fn bootstrapped_returns(&self, gamma: f64) -> Result<Array2<f64>> {
        self.check_return_inputs()?;
        let mut returns = Array2::zeros(self.rewards.raw_dim());
        for n in 0..self.num_env() {
            let column = bootstrapped(
                &self.rewards.column(n).to_owned(),
                &self.dones_for(n)?,
                gamma,
                self.last_values[n],
            )?;
            returns.column_mut(n).assign(&column);
        }
        Ok(returns)
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RLError::Length { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    fn transition(reward: f64, done: bool) -> Transition {
        Transition {
            observation: arr1(&[0.0]),
            output: PolicyOutput {
                action: SpaceValue::Discrete(0),
                log_prob: -0.5,
                entropy: 0.7,
                state_value: Some(1.0),
            },
            reward,
            next_observation: arr1(&[0.0]),
            done,
        }
    }

    fn assert_close(actual: &Array1<f64>, expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_abs_diff_eq!(*a, *e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_discounted_returns() {
        let mut trajectory = Trajectory::new();
        trajectory.push(transition(1.0, false));
        trajectory.push(transition(2.0, false));
        trajectory.push(transition(3.0, true));

        assert!(trajectory.completed());
        assert_abs_diff_eq!(trajectory.total_reward, 6.0);
        assert_close(&trajectory.all_discounted_returns(0.1).unwrap(), &[1.23, 2.3, 3.0]);
        assert_close(&trajectory.bootstrapped_returns(0.1, 100.0).unwrap(), &[1.23, 2.3, 3.0]);
    }

    #[test]
    fn test_truncated_trajectory_bootstraps() {
        let mut trajectory = Trajectory::new();
        trajectory.push(transition(1.0, false));
        trajectory.push(transition(1.0, false));

        assert!(!trajectory.completed());
        assert_close(&trajectory.bootstrapped_returns(0.5, 4.0).unwrap(), &[2.5, 3.0]);
    }

    #[test]
    fn test_values_required() {
        let mut trajectory = Trajectory::new();
        let mut t = transition(1.0, true);
        t.output.state_value = None;
        trajectory.push(t);
        assert!(matches!(trajectory.values(), Err(RLError::Policy(_))));
    }

    #[test]
    fn test_segment_returns_do_not_cross_episodes() {
        let segment = Segment {
            observations: vec![Array2::zeros((2, 1)); 3],
            outputs: Vec::new(),
            rewards: ndarray::arr2(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]),
            dones: vec![vec![false, false], vec![true, false], vec![false, false]],
            last_values: arr1(&[10.0, 10.0]),
        };
        let returns = segment.bootstrapped_returns(0.5).unwrap();
        assert_close(&returns.column(0).to_owned(), &[1.5, 1.0, 6.0]);
        assert_close(&returns.column(1).to_owned(), &[3.0, 4.0, 6.0]);
    }

    #[test]
    fn test_ragged_segment_is_an_error() {
        let segment = Segment {
            observations: vec![Array2::zeros((2, 1)); 2],
            outputs: Vec::new(),
            rewards: ndarray::arr2(&[[1.0, 1.0], [1.0, 1.0]]),
            dones: vec![vec![false, false], vec![true]],
            last_values: arr1(&[0.0, 0.0]),
        };
        assert!(matches!(
            segment.bootstrapped_returns(0.9),
            Err(RLError::Length { expected: 2, actual: 1 })
        ));
        assert!(matches!(segment.dones_for(1), Err(RLError::Length { .. })));

        let short_values = Segment {
            dones: vec![vec![false, false]; 2],
            last_values: arr1(&[0.0]),
            ..segment.clone()
        };
        assert!(matches!(
            short_values.bootstrapped_returns(0.9),
            Err(RLError::Length { expected: 2, actual: 1 })
        ));
        // Outputs were never recorded
        assert!(matches!(
            short_values.validate(),
            Err(RLError::Length { expected: 2, actual: 0 })
        ));
    }
}
