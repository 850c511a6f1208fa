//! Policy networks for policy-gradient agents
//!
//! Agents treat a policy as an opaque, differentiable map from observations
//! to action distributions. Parameters are exchanged as one flat vector so
//! that optimizers and checkpoints stay independent of the network layout.

use ndarray::{s, Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use pgkit_core::{PolicyOutput, RLError, Result, SpaceValue};

/// Log-probability, entropy and value of a policy at one observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Log-probability of the evaluated action
    pub log_prob: f64,
    /// Entropy of the action distribution
    pub entropy: f64,
    /// State value, if the policy has a value head
    pub value: Option<f64>,
}

/// Target of the squared value error in a step loss
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueTarget {
    /// Regression target for `V(s)`
    pub target: f64,
    /// Weight of `(V(s) - target)^2`
    pub weight: f64,
}

/// Weights of the terms of a single-step loss
///
/// The loss is `-advantage * log pi(a|s) - entropy * H(pi(.|s))`, plus
/// `weight * (V(s) - target)^2` when a value target is given.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepCoefficients {
    /// Weight of `-log pi(a|s)`
    pub advantage: f64,
    /// Weight of `-H(pi(.|s))`
    pub entropy: f64,
    /// Value regression term
    pub value: Option<ValueTarget>,
}

/// Differentiable stochastic policy
pub trait PolicyNetwork: Send + Sync {
    /// Sample an action for `observation`
    fn act(&self, observation: ArrayView1<'_, f64>, rng: &mut dyn RngCore) -> Result<PolicyOutput>;

    /// Score a given action at `observation`
    fn evaluate(&self, observation: ArrayView1<'_, f64>, action: &SpaceValue) -> Result<Evaluation>;

    /// Gradient of the step loss described by `coefficients` w.r.t. [`parameters`](Self::parameters)
    fn gradient(
        &self,
        observation: ArrayView1<'_, f64>,
        action: &SpaceValue,
        coefficients: &StepCoefficients,
    ) -> Result<Array1<f64>>;

    /// State value of `observation`, if the policy has a value head
    fn value(&self, observation: ArrayView1<'_, f64>) -> Result<Option<f64>>;

    /// Whether [`value`](Self::value) returns estimates
    fn has_value_head(&self) -> bool;

    /// All parameters, flattened
    fn parameters(&self) -> Array1<f64>;

    /// Replace all parameters
    fn set_parameters(&mut self, params: &Array1<f64>) -> Result<()>;

    /// Number of parameters
    fn num_parameters(&self) -> usize {
        self.parameters().len()
    }

    /// Clone the network
    fn clone_network(&self) -> Box<dyn PolicyNetwork>;
}

impl std::fmt::Debug for dyn PolicyNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyNetwork")
            .field("num_parameters", &self.num_parameters())
            .field("has_value_head", &self.has_value_head())
            .finish()
    }
}

/// Shape and initialization of a [`LinearSoftmaxPolicy`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearPolicyConfig {
    /// Observation dimension
    pub obs_dim: usize,
    /// Number of discrete actions
    pub num_actions: usize,
    /// Whether to include a linear value head
    pub use_value_head: bool,
    /// Standard deviation of the initial weights
    pub init_scale: f64,
    /// Seed for weight initialization
    pub seed: Option<u64>,
}

impl Default for LinearPolicyConfig {
    fn default() -> Self {
        Self {
            obs_dim: 4,
            num_actions: 2,
            use_value_head: true,
            init_scale: 0.01,
            seed: None,
        }
    }
}

/// Categorical policy with logits `W s + b` and an optional value head `v . s + c`
///
/// Flattened parameter layout: `W` row-major, `b`, then `v` and `c` when the
/// value head is present.
#[derive(Debug, Clone)]
pub struct LinearSoftmaxPolicy {
    config: LinearPolicyConfig,
    weights: Array2<f64>,
    bias: Array1<f64>,
    value_weights: Option<Array1<f64>>,
    value_bias: f64,
}

impl LinearSoftmaxPolicy {
    /// Create a policy with small random weights
    pub fn new(config: LinearPolicyConfig) -> Result<Self> {
        if config.obs_dim == 0 || config.num_actions == 0 {
            return Err(RLError::Value(format!(
                "policy needs obs_dim and num_actions > 0, got {} and {}",
                config.obs_dim, config.num_actions
            )));
        }
        let normal = Normal::new(0.0, config.init_scale)
            .map_err(|e| RLError::Value(format!("invalid init_scale {}: {e}", config.init_scale)))?;
        let mut rng = config.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        let weights = Array2::from_shape_fn((config.num_actions, config.obs_dim), |_| normal.sample(&mut rng));
        let bias = Array1::zeros(config.num_actions);
        let value_weights = config.use_value_head.then(|| Array1::zeros(config.obs_dim));

        Ok(Self {
            config,
            weights,
            bias,
            value_weights,
            value_bias: 0.0,
        })
    }

    /// Shape and initialization settings
    #[must_use]
    pub fn config(&self) -> &LinearPolicyConfig {
        &self.config
    }

    /// Action probabilities at `observation`
    pub fn probabilities(&self, observation: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        self.check_observation(observation)?;
        let logits = self.weights.dot(&observation) + &self.bias;
        Ok(softmax(&logits))
    }

    fn check_observation(&self, observation: ArrayView1<'_, f64>) -> Result<()> {
        if observation.len() == self.config.obs_dim {
            Ok(())
        } else {
            Err(RLError::DimensionMismatch {
                expected: self.config.obs_dim,
                actual: observation.len(),
            })
        }
    }

    fn action_index(&self, action: &SpaceValue) -> Result<usize> {
        action
            .as_discrete()
            .filter(|&a| a < self.config.num_actions)
            .ok_or_else(|| {
                RLError::InvalidAction(format!(
                    "expected an action in 0..{}, got {action:?}",
                    self.config.num_actions
                ))
            })
    }

    fn value_unchecked(&self, observation: ArrayView1<'_, f64>) -> Option<f64> {
        self.value_weights
            .as_ref()
            .map(|v| v.dot(&observation) + self.value_bias)
    }
}

/// Numerically stable softmax
fn softmax(logits: &Array1<f64>) -> Array1<f64> {
    let max = logits.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp = logits.mapv(|z| (z - max).exp());
    let sum = exp.sum();
    exp / sum
}

fn entropy(probs: &Array1<f64>) -> f64 {
    -probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.ln())
        .sum::<f64>()
}

impl PolicyNetwork for LinearSoftmaxPolicy {
    fn act(&self, observation: ArrayView1<'_, f64>, rng: &mut dyn RngCore) -> Result<PolicyOutput> {
        let probs = self.probabilities(observation)?;

        let sample = rng.gen::<f64>();
        let mut cumsum = 0.0;
        let mut action = probs.len() - 1;
        for (i, &p) in probs.iter().enumerate() {
            cumsum += p;
            if sample < cumsum {
                action = i;
                break;
            }
        }

        Ok(PolicyOutput {
            action: SpaceValue::Discrete(action),
            log_prob: probs[action].ln(),
            entropy: entropy(&probs),
            state_value: self.value_unchecked(observation),
        })
    }

    fn evaluate(&self, observation: ArrayView1<'_, f64>, action: &SpaceValue) -> Result<Evaluation> {
        let action = self.action_index(action)?;
        let probs = self.probabilities(observation)?;
        Ok(Evaluation {
            log_prob: probs[action].ln(),
            entropy: entropy(&probs),
            value: self.value_unchecked(observation),
        })
    }

    fn gradient(
        &self,
        observation: ArrayView1<'_, f64>,
        action: &SpaceValue,
        coefficients: &StepCoefficients,
    ) -> Result<Array1<f64>> {
        let action = self.action_index(action)?;
        let probs = self.probabilities(observation)?;
        let h = entropy(&probs);

        // dL/dz_k = -A (1[k=a] - p_k) + c_H p_k (log p_k + H)
        let mut dlogits = probs.mapv(|p| {
            let log_p = if p > 0.0 { p.ln() } else { 0.0 };
            coefficients.advantage * p + coefficients.entropy * p * (log_p + h)
        });
        dlogits[action] -= coefficients.advantage;

        let (a, d) = self.weights.dim();
        let mut grad = Array1::zeros(self.num_parameters());
        for k in 0..a {
            grad.slice_mut(s![k * d..(k + 1) * d])
                .assign(&observation.mapv(|x| x * dlogits[k]));
        }
        grad.slice_mut(s![a * d..a * d + a]).assign(&dlogits);

        if let Some(target) = coefficients.value {
            let value = self.value_unchecked(observation).ok_or_else(|| {
                RLError::Policy("value target given to a policy without a value head".to_string())
            })?;
            let dvalue = 2.0 * target.weight * (value - target.target);
            let offset = a * d + a;
            grad.slice_mut(s![offset..offset + d])
                .assign(&observation.mapv(|x| x * dvalue));
            grad[offset + d] = dvalue;
        }

        Ok(grad)
    }

    fn value(&self, observation: ArrayView1<'_, f64>) -> Result<Option<f64>> {
        self.check_observation(observation)?;
        Ok(self.value_unchecked(observation))
    }

    fn has_value_head(&self) -> bool {
        self.value_weights.is_some()
    }

    fn parameters(&self) -> Array1<f64> {
        let mut params: Vec<f64> = self.weights.iter().copied().collect();
        params.extend(self.bias.iter().copied());
        if let Some(v) = &self.value_weights {
            params.extend(v.iter().copied());
            params.push(self.value_bias);
        }
        Array1::from(params)
    }

    fn set_parameters(&mut self, params: &Array1<f64>) -> Result<()> {
        let expected = self.num_parameters();
        if params.len() != expected {
            return Err(RLError::DimensionMismatch {
                expected,
                actual: params.len(),
            });
        }
        let (a, d) = self.weights.dim();
        let weights = params.slice(s![..a * d]).to_owned();
        self.weights = weights
            .into_shape((a, d))
            .map_err(|e| RLError::Shape(format!("cannot reshape policy weights: {e}")))?;
        self.bias.assign(&params.slice(s![a * d..a * d + a]));

        let offset = a * d + a;
        if let Some(v) = &mut self.value_weights {
            v.assign(&params.slice(s![offset..offset + d]));
            self.value_bias = params[offset + d];
        }
        Ok(())
    }

    fn num_parameters(&self) -> usize {
        let (a, d) = self.weights.dim();
        a * d + a + if self.value_weights.is_some() { d + 1 } else { 0 }
    }

    fn clone_network(&self) -> Box<dyn PolicyNetwork> {
        Box::new(self.clone())
    }
}
