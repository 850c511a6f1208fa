//! Classic control environments

use ndarray::{arr1, Array1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use pgkit_core::{
    BoxSpace, DiscreteSpace, Environment, RLError, Result, Space, SpaceValue, Step, StepInfo,
};

/// Physical constants and termination thresholds of [`CartPoleEnv`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartPoleConfig {
    /// Gravitational acceleration
    pub gravity: f64,
    /// Mass of the cart
    pub mass_cart: f64,
    /// Mass of the pole
    pub mass_pole: f64,
    /// Half the pole length
    pub length: f64,
    /// Magnitude of the push applied by an action
    pub force_mag: f64,
    /// Integration time step in seconds
    pub tau: f64,
    /// Cart position beyond which the episode ends
    pub x_threshold: f64,
    /// Pole angle (radians) beyond which the episode ends
    pub theta_threshold: f64,
}

impl Default for CartPoleConfig {
    fn default() -> Self {
        Self {
            gravity: 9.8,
            mass_cart: 1.0,
            mass_pole: 0.1,
            length: 0.5,
            force_mag: 10.0,
            tau: 0.02,
            x_threshold: 2.4,
            theta_threshold: 12.0_f64.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CartPoleState {
    x: f64,          // Cart position
    x_dot: f64,      // Cart velocity
    theta: f64,      // Pole angle
    theta_dot: f64,  // Pole angular velocity
}

/// Balance a pole on a cart by pushing it left (`0`) or right (`1`)
///
/// Every step the pole stays up earns `+1`. The episode ends when the pole
/// tips past the angle threshold or the cart leaves the track; there is no
/// built-in horizon, wrap it in [`TimeLimit`](crate::TimeLimit) for one.
#[derive(Debug, Clone)]
pub struct CartPoleEnv {
    state: CartPoleState,
    config: CartPoleConfig,
    observation_space: BoxSpace,
    rng: StdRng,
    needs_reset: bool,
}

impl CartPoleEnv {
    /// Create a CartPole environment; thresholds must be positive
    pub fn new(config: CartPoleConfig) -> Result<Self> {
        if !(config.x_threshold > 0.0 && config.theta_threshold > 0.0) {
            return Err(RLError::Value(format!(
                "CartPole thresholds must be positive, got x={} theta={}",
                config.x_threshold, config.theta_threshold
            )));
        }
        let high = arr1(&[
            config.x_threshold * 2.0,
            f64::INFINITY,
            config.theta_threshold * 2.0,
            f64::INFINITY,
        ]);
        let observation_space = BoxSpace::new(high.mapv(|x| -x), high)?;

        Ok(Self {
            state: CartPoleState::default(),
            config,
            observation_space,
            rng: StdRng::from_entropy(),
            needs_reset: true,
        })
    }

    /// Physical configuration
    #[must_use]
    pub fn config(&self) -> &CartPoleConfig {
        &self.config
    }

    fn observation(&self) -> Array1<f64> {
        arr1(&[self.state.x, self.state.x_dot, self.state.theta, self.state.theta_dot])
    }

    fn is_done(&self) -> bool {
        self.state.x.abs() > self.config.x_threshold
            || self.state.theta.abs() > self.config.theta_threshold
    }
}

impl Environment for CartPoleEnv {
    fn observation_space(&self) -> Box<dyn Space> {
        Box::new(self.observation_space.clone())
    }

    fn action_space(&self) -> Box<dyn Space> {
        Box::new(DiscreteSpace::new(2))
    }

    fn reset(&mut self) -> Result<Array1<f64>> {
        let init = Uniform::new(-0.05, 0.05);
        self.state = CartPoleState {
            x: init.sample(&mut self.rng),
            x_dot: init.sample(&mut self.rng),
            theta: init.sample(&mut self.rng),
            theta_dot: init.sample(&mut self.rng),
        };
        self.needs_reset = false;
        Ok(self.observation())
    }

    fn step(&mut self, action: &SpaceValue) -> Result<Step> {
        if self.needs_reset {
            return Err(RLError::Environment(
                "step called on a finished episode, call reset first".to_string(),
            ));
        }
        let force = match action.as_discrete() {
            Some(0) => -self.config.force_mag,
            Some(1) => self.config.force_mag,
            _ => return Err(RLError::InvalidAction(format!("CartPole expects 0 or 1, got {action:?}"))),
        };

        let c = &self.config;
        let cos_theta = self.state.theta.cos();
        let sin_theta = self.state.theta.sin();
        let total_mass = c.mass_cart + c.mass_pole;
        let pole_mass_length = c.mass_pole * c.length;

        let temp = (force + pole_mass_length * self.state.theta_dot.powi(2) * sin_theta) / total_mass;
        let theta_acc = (c.gravity * sin_theta - cos_theta * temp)
            / (c.length * (4.0 / 3.0 - c.mass_pole * cos_theta.powi(2) / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        // Euler integration
        self.state.x += c.tau * self.state.x_dot;
        self.state.x_dot += c.tau * x_acc;
        self.state.theta += c.tau * self.state.theta_dot;
        self.state.theta_dot += c.tau * theta_acc;

        let done = self.is_done();
        self.needs_reset = done;

        Ok(Step {
            observation: self.observation(),
            reward: 1.0,
            done,
            info: StepInfo::default(),
        })
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}
