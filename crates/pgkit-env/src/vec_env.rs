//! Vectorized environments

use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::{debug, trace};

use pgkit_core::environment::TERMINAL_OBSERVATION_KEY;
use pgkit_core::{Environment, RLError, Result, Space, SpaceValue, VecEnv, VecStep};

/// Stack equally sized observations into one row each
pub fn stack_observations(observations: &[Array1<f64>]) -> Result<Array2<f64>> {
    let views: Vec<ArrayView1<'_, f64>> = observations.iter().map(Array1::view).collect();
    ndarray::stack(Axis(0), &views).map_err(|e| RLError::Shape(format!("cannot stack observations: {e}")))
}

/// Build `num_env` environments, seeding them with `init_seed`, `init_seed + 1`, ...
pub fn make_envs<E, F>(mut factory: F, num_env: usize, init_seed: u64) -> Result<Vec<E>>
where
    E: Environment,
    F: FnMut(usize) -> Result<E>,
{
    (0..num_env)
        .map(|i| {
            let mut env = factory(i)?;
            env.seed(init_seed + i as u64);
            Ok(env)
        })
        .collect()
}

/// Steps a list of environments one after another in the calling thread
///
/// A sub-environment whose episode ends is reset immediately: the returned
/// observation is the first one of the new episode and the last one of the
/// finished episode is stored in `info["terminal_observation"]`.
#[derive(Debug)]
pub struct SerialVecEnv<E> {
    envs: Vec<E>,
}

impl<E: Environment> SerialVecEnv<E> {
    /// Wrap at least one environment
    pub fn new(envs: Vec<E>) -> Result<Self> {
        if envs.is_empty() {
            return Err(RLError::Value("a vectorized environment needs at least one environment".to_string()));
        }
        debug!(num_env = envs.len(), "created serial vectorized environment");
        Ok(Self { envs })
    }

    /// The wrapped environments
    #[must_use]
    pub fn envs(&self) -> &[E] {
        &self.envs
    }
}

impl<E: Environment> VecEnv for SerialVecEnv<E> {
    fn num_env(&self) -> usize {
        self.envs.len()
    }

    fn observation_space(&self) -> Box<dyn Space> {
        self.envs[0].observation_space()
    }

    fn action_space(&self) -> Box<dyn Space> {
        self.envs[0].action_space()
    }

    fn reset(&mut self) -> Result<Array2<f64>> {
        let observations = self
            .envs
            .iter_mut()
            .map(Environment::reset)
            .collect::<Result<Vec<_>>>()?;
        stack_observations(&observations)
    }

    fn step(&mut self, actions: &[SpaceValue]) -> Result<VecStep> {
        if actions.len() != self.envs.len() {
            return Err(RLError::Length {
                expected: self.envs.len(),
                actual: actions.len(),
            });
        }

        let n = self.envs.len();
        let mut observations = Vec::with_capacity(n);
        let mut rewards = Array1::zeros(n);
        let mut dones = Vec::with_capacity(n);
        let mut infos = Vec::with_capacity(n);

        for (i, (env, action)) in self.envs.iter_mut().zip(actions).enumerate() {
            let mut step = env.step(action)?;
            if step.done {
                trace!(env = i, "sub-environment finished, resetting");
                step.info.insert(TERMINAL_OBSERVATION_KEY, step.observation.to_vec());
                step.observation = env.reset()?;
            }
            observations.push(step.observation);
            rewards[i] = step.reward;
            dones.push(step.done);
            infos.push(step.info);
        }

        Ok(VecStep {
            observations: stack_observations(&observations)?,
            rewards,
            dones,
            infos,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.envs.iter_mut().try_for_each(Environment::close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GridMazeConfig, GridMazeEnv};

    fn corridor(i: usize) -> Result<GridMazeEnv> {
        // Same three-cell corridor for every env; env `i` starts `i + 1` steps from the goal
        GridMazeEnv::new(GridMazeConfig {
            height: 1,
            width: 3,
            walls: Vec::new(),
            start: (0, 1 - i.min(1)),
            goal: (0, 2),
            ..GridMazeConfig::default()
        })
    }

    #[test]
    fn test_make_envs_builds_each() {
        let envs = make_envs(corridor, 3, 7).unwrap();
        assert_eq!(envs.len(), 3);
        assert_eq!(envs[2].config().width, 3);
        assert_eq!(envs[0].config().start, (0, 1));
        assert_eq!(envs[2].config().start, (0, 0));
    }

    #[test]
    fn test_auto_reset() {
        let mut venv = SerialVecEnv::new(make_envs(corridor, 2, 0).unwrap()).unwrap();
        assert_eq!(venv.num_env(), 2);
        let obs = venv.reset().unwrap();
        assert_eq!(obs.dim(), (2, 3));
        assert_eq!(obs.row(0).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(obs.row(1).to_vec(), vec![1.0, 0.0, 0.0]);

        let right = [SpaceValue::Discrete(1), SpaceValue::Discrete(1)];
        let step = venv.step(&right).unwrap();
        assert_eq!(step.dones, vec![true, false]);
        assert_eq!(step.rewards[0], 1.0);
        assert!((step.rewards[1] + 0.01).abs() < 1e-12);

        // The first env restarted at its start cell; the terminal one is kept in info
        assert_eq!(step.observations.row(0).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(step.observations.row(1).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(
            step.infos[0].terminal_observation().unwrap().to_vec(),
            vec![0.0, 0.0, 1.0]
        );
        assert!(step.infos[1].terminal_observation().is_none());

        let step = venv.step(&right).unwrap();
        assert_eq!(step.dones, vec![true, true]);
    }

    #[test]
    fn test_action_count_must_match() {
        let mut venv = SerialVecEnv::new(make_envs(corridor, 2, 0).unwrap()).unwrap();
        venv.reset().unwrap();
        let err = venv.step(&[SpaceValue::Discrete(1)]).unwrap_err();
        assert!(matches!(err, RLError::Length { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_empty_is_rejected() {
        assert!(SerialVecEnv::<GridMazeEnv>::new(Vec::new()).is_err());
    }
}
