//! Core reinforcement learning types, online statistics and trajectory transforms for pgkit
//!
//! This crate provides the foundational pieces shared by the environment and
//! agent crates: input canonicalization, elementwise and sequence transforms,
//! running mean/std estimation, discounted-return computation, spaces,
//! environment traits and trajectory buffers.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod environment;
pub mod error;
pub mod signal;
pub mod space;
pub mod trajectory;
pub mod transform;

// Re-export core traits and types
pub use environment::{Environment, EnvironmentConfig, Step, StepInfo, VecEnv, VecStep};
pub use error::{RLError, Result};
pub use signal::{IntoBatch, IntoSignal, Signal};
pub use space::{BoxSpace, DiscreteSpace, ProductSpace, Space, SpaceValue};
pub use trajectory::{PolicyOutput, Segment, Trajectory, Transition};
pub use transform::{
    Centralize, Clip, ExpFactorCumSum, IntoMask, Mask, Normalize, PolySmooth, RankTransform,
    RunningMeanStd, Standardize, Transform, DEFAULT_EPS,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Environment, IntoSignal, PolicyOutput, Result, RunningMeanStd, Space, SpaceValue, Step,
        Trajectory, Transform, VecEnv,
    };
}
