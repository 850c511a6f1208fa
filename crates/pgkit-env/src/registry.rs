//! Environment registry for creating environments by name

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use tracing::debug;

use pgkit_core::{Environment, EnvironmentConfig, RLError, Result};

use crate::{CartPoleConfig, CartPoleEnv, GridMazeConfig, GridMazeEnv, TimeLimit};

/// A type-erased environment
pub type BoxedEnv = Box<dyn Environment>;

type EnvConstructor = Box<dyn Fn(&EnvironmentConfig) -> Result<BoxedEnv> + Send + Sync>;

lazy_static::lazy_static! {
    static ref REGISTRY: Arc<Mutex<EnvRegistry>> = Arc::new(Mutex::new(EnvRegistry::with_builtins()));
}

/// Table of named environment constructors
pub struct EnvRegistry {
    envs: HashMap<String, EnvConstructor>,
}

impl std::fmt::Debug for EnvRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvRegistry").field("envs", &self.list()).finish()
    }
}

/// Decode the flattened `params` of a config into an environment-specific config
pub fn decode_params<T: DeserializeOwned>(config: &EnvironmentConfig) -> Result<T> {
    let params = serde_json::Value::Object(config.params.clone());
    Ok(serde_json::from_value(params)?)
}

/// Apply the shared parts of a config: seed, then an optional time limit
pub fn finish_env<E: Environment + 'static>(mut env: E, config: &EnvironmentConfig) -> BoxedEnv {
    if let Some(seed) = config.seed {
        env.seed(seed);
    }
    match config.max_steps {
        Some(max_steps) => Box::new(TimeLimit::new(env, max_steps)),
        None => Box::new(env),
    }
}

impl EnvRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            envs: HashMap::new(),
        }
    }

    /// Registry holding `"CartPole"` and `"GridMaze"`
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("CartPole", |config| {
            let env = CartPoleEnv::new(decode_params::<CartPoleConfig>(config)?)?;
            Ok(finish_env(env, config))
        });
        registry.register("GridMaze", |config| {
            let env = GridMazeEnv::new(decode_params::<GridMazeConfig>(config)?)?;
            Ok(finish_env(env, config))
        });
        registry
    }

    /// Register an environment, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&EnvironmentConfig) -> Result<BoxedEnv> + Send + Sync + 'static,
    {
        self.envs.insert(name.into(), Box::new(constructor));
    }

    /// Create an environment by name
    pub fn make(&self, name: &str, config: &EnvironmentConfig) -> Result<BoxedEnv> {
        let constructor = self
            .envs
            .get(name)
            .ok_or_else(|| RLError::Environment(format!("Unknown environment: {name}")))?;
        debug!(name, seed = ?config.seed, max_steps = ?config.max_steps, "making environment");
        constructor(config)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.envs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for EnvRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn global() -> Result<MutexGuard<'static, EnvRegistry>> {
    REGISTRY
        .lock()
        .map_err(|_| RLError::Environment("environment registry lock poisoned".to_string()))
}

/// Register an environment globally
pub fn register_env<F>(name: impl Into<String>, constructor: F) -> Result<()>
where
    F: Fn(&EnvironmentConfig) -> Result<BoxedEnv> + Send + Sync + 'static,
{
    global()?.register(name, constructor);
    Ok(())
}

/// Create a registered environment by name
pub fn make_env(name: &str, config: &EnvironmentConfig) -> Result<BoxedEnv> {
    global()?.make(name, config)
}

/// List all registered environments
pub fn list_envs() -> Result<Vec<String>> {
    Ok(global()?.list())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgkit_core::SpaceValue;

    #[test]
    fn test_builtins_are_registered() {
        let names = list_envs().unwrap();
        assert!(names.contains(&"CartPole".to_string()));
        assert!(names.contains(&"GridMaze".to_string()));
    }

    #[test]
    fn test_make_with_params_and_time_limit() {
        let config: EnvironmentConfig = serde_json::from_str(
            r#"{"seed": 1, "max_steps": 2, "height": 1, "width": 6, "walls": [], "goal": [0, 5]}"#,
        )
        .unwrap();
        let mut env = make_env("GridMaze", &config).unwrap();
        assert_eq!(env.max_episode_steps(), Some(2));
        assert_eq!(env.observation_space().flat_dim(), 6);

        env.reset().unwrap();
        assert!(!env.step(&SpaceValue::Discrete(1)).unwrap().done);
        let step = env.step(&SpaceValue::Discrete(1)).unwrap();
        assert!(step.done);
        assert!(step.info.is_truncated());
    }

    #[test]
    fn test_unknown_name() {
        let err = make_env("Pendulum", &EnvironmentConfig::default()).err().unwrap();
        assert!(matches!(err, RLError::Environment(_)));
    }

    #[test]
    fn test_bad_params_fail() {
        let config: EnvironmentConfig = serde_json::from_str(r#"{"tau": "fast"}"#).unwrap();
        assert!(matches!(make_env("CartPole", &config), Err(RLError::Serialization(_))));
    }

    #[test]
    fn test_register_custom() {
        let mut registry = EnvRegistry::new();
        registry.register("Short", |config| {
            let env = CartPoleEnv::new(CartPoleConfig::default())?;
            Ok(finish_env(env, &EnvironmentConfig { max_steps: Some(1), ..config.clone() }))
        });
        let env = registry.make("Short", &EnvironmentConfig::default()).unwrap();
        assert_eq!(env.max_episode_steps(), Some(1));
        assert_eq!(registry.list(), vec!["Short".to_string()]);
    }
}
