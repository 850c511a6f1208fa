//! Policy-gradient agents for pgkit
//!
//! This crate provides:
//! - [`LinearSoftmaxPolicy`], a categorical policy with analytic gradients
//! - [`Optimizer`] (SGD or Adam) with learning-rate [`Schedule`]s
//! - The [`ReinforceAgent`], [`ActorCriticAgent`] and [`A2CAgent`] learners
//! - [`TrajectoryRunner`] and [`SegmentRunner`] for collecting rollouts

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod a2c;
pub mod actor_critic;
pub mod agent;
pub mod optim;
pub mod policy;
pub mod reinforce;
pub mod runner;
pub mod schedule;

// Re-export agents
pub use a2c::A2CAgent;
pub use actor_critic::ActorCriticAgent;
pub use agent::{Agent, AgentConfig, Checkpoint, LearnOutput};
pub use reinforce::ReinforceAgent;

// Re-export policies and optimization
pub use optim::{Optimizer, OptimizerKind, OptimizerStep};
pub use policy::{
    Evaluation, LinearPolicyConfig, LinearSoftmaxPolicy, PolicyNetwork, StepCoefficients, ValueTarget,
};
pub use runner::{SegmentRunner, TrajectoryRunner};
pub use schedule::{ConstantSchedule, ExponentialSchedule, LinearSchedule, Schedule};
