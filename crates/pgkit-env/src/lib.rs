//! Environments and vectorized environment wrappers for pgkit
//!
//! This crate provides:
//! - Toy tasks: [`CartPoleEnv`] and [`GridMazeEnv`]
//! - The [`TimeLimit`] wrapper
//! - [`SerialVecEnv`] and [`make_envs`] for batched stepping
//! - [`StandardizeVecEnv`], which standardizes observations and scales rewards
//!   with running statistics
//! - A registry for creating environments by name

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classic;
pub mod maze;
pub mod registry;
pub mod standardize;
pub mod vec_env;
pub mod wrappers;

// Re-export environments
pub use classic::{CartPoleConfig, CartPoleEnv};
pub use maze::{GridMazeConfig, GridMazeEnv};
pub use registry::{list_envs, make_env, register_env, BoxedEnv, EnvRegistry};
pub use standardize::{StandardizeConfig, StandardizeVecEnv};
pub use vec_env::{make_envs, stack_observations, SerialVecEnv};
pub use wrappers::TimeLimit;

// Re-export core types
pub use pgkit_core::{Environment, EnvironmentConfig, Step, StepInfo, VecEnv, VecStep};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        make_env, make_envs, CartPoleEnv, GridMazeEnv, SerialVecEnv, StandardizeVecEnv,
        TimeLimit,
    };
    pub use pgkit_core::prelude::*;
}
