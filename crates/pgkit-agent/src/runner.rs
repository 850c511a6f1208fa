//! Rollout collection
//!
//! [`TrajectoryRunner`] plays whole episodes on one environment for
//! Monte-Carlo agents. [`SegmentRunner`] advances a vectorized environment a
//! fixed number of steps per call for n-step agents, keeping the current
//! observation between calls so episodes continue across segments.

use ndarray::{Array1, Array2};
use rand::RngCore;
use tracing::{debug, trace};

use pgkit_core::{Environment, RLError, Result, Segment, SpaceValue, Trajectory, Transition, VecEnv};

use crate::agent::Agent;

/// Collects up to `max_steps` transitions per episode from a single environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectoryRunner {
    /// Step limit per episode
    pub max_steps: usize,
}

impl TrajectoryRunner {
    /// Create a runner stopping episodes after `max_steps`
    #[must_use]
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }

    /// Play `num_episodes` episodes with `agent`
    ///
    /// An episode stops at `done` or after `max_steps` steps, whichever
    /// comes first. Trajectories cut off by the step limit are not
    /// [`completed`](Trajectory::completed).
    pub fn run<A, E>(
        &self,
        agent: &A,
        env: &mut E,
        num_episodes: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Trajectory>>
    where
        A: Agent + ?Sized,
        E: Environment + ?Sized,
    {
        if self.max_steps == 0 {
            return Err(RLError::Value("max_steps must be positive".to_string()));
        }
        let mut trajectories = Vec::with_capacity(num_episodes);
        for episode in 0..num_episodes {
            let mut observation = env.reset()?;
            let mut trajectory = Trajectory::new();
            for _ in 0..self.max_steps {
                let output = agent.choose_action(observation.view(), rng)?;
                let step = env.step(&output.action)?;
                let done = step.done;
                trajectory.push(Transition {
                    observation,
                    output,
                    reward: step.reward,
                    next_observation: step.observation.clone(),
                    done,
                });
                observation = step.observation;
                if done {
                    break;
                }
            }
            debug!(
                episode,
                len = trajectory.len(),
                total_reward = trajectory.total_reward,
                completed = trajectory.completed(),
                "episode finished"
            );
            trajectories.push(trajectory);
        }
        Ok(trajectories)
    }
}

/// Collects fixed-length [`Segment`]s from a vectorized environment
#[derive(Debug)]
pub struct SegmentRunner<V> {
    env: V,
    observation: Option<Array2<f64>>,
    episode_returns: Array1<f64>,
    episode_lengths: Vec<usize>,
}

impl<V: VecEnv> SegmentRunner<V> {
    /// Wrap a vectorized environment; the first call to [`run`](Self::run) resets it
    pub fn new(env: V) -> Self {
        let num_env = env.num_env();
        Self {
            env,
            observation: None,
            episode_returns: Array1::zeros(num_env),
            episode_lengths: vec![0; num_env],
        }
    }

    /// The wrapped environment
    pub fn env(&self) -> &V {
        &self.env
    }

    /// Unwrap the environment
    pub fn into_inner(self) -> V {
        self.env
    }

    /// Step every environment `steps` times with `agent`
    ///
    /// `last_values` holds the agent's value of the observation after the
    /// final step, or zero when the policy has no value head.
    pub fn run<A>(&mut self, agent: &A, steps: usize, rng: &mut dyn RngCore) -> Result<Segment>
    where
        A: Agent + ?Sized,
    {
        if steps == 0 {
            return Err(RLError::Value("a segment needs at least one step".to_string()));
        }
        let mut current = match self.observation.take() {
            Some(observation) => observation,
            None => self.env.reset()?,
        };
        let num_env = current.nrows();

        let mut observations = Vec::with_capacity(steps);
        let mut outputs = Vec::with_capacity(steps);
        let mut rewards = Array2::zeros((steps, num_env));
        let mut dones = Vec::with_capacity(steps);

        for t in 0..steps {
            let step_outputs = current
                .rows()
                .into_iter()
                .map(|obs| agent.choose_action(obs, rng))
                .collect::<Result<Vec<_>>>()?;
            let actions: Vec<SpaceValue> = step_outputs.iter().map(|o| o.action.clone()).collect();
            let step = self.env.step(&actions)?;
            for len in [step.rewards.len(), step.dones.len(), step.observations.nrows()] {
                if len != num_env {
                    return Err(RLError::Length {
                        expected: num_env,
                        actual: len,
                    });
                }
            }

            rewards.row_mut(t).assign(&step.rewards);
            self.track_episodes(&step.rewards, &step.dones);
            observations.push(std::mem::replace(&mut current, step.observations));
            outputs.push(step_outputs);
            dones.push(step.dones);
        }

        let last_values = current
            .rows()
            .into_iter()
            .map(|obs| agent.value(obs).map(|v| v.unwrap_or(0.0)))
            .collect::<Result<Array1<f64>>>()?;
        self.observation = Some(current);

        trace!(steps, num_env, "collected segment");
        Ok(Segment {
            observations,
            outputs,
            rewards,
            dones,
            last_values,
        })
    }

    fn track_episodes(&mut self, rewards: &Array1<f64>, dones: &[bool]) {
        for (n, &done) in dones.iter().enumerate() {
            self.episode_returns[n] += rewards[n];
            self.episode_lengths[n] += 1;
            if done {
                debug!(
                    env = n,
                    len = self.episode_lengths[n],
                    total_reward = self.episode_returns[n],
                    "episode finished"
                );
                self.episode_returns[n] = 0.0;
                self.episode_lengths[n] = 0;
            }
        }
    }
}
