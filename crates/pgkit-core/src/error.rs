//! Error types for the pgkit core library

use thiserror::Error;

/// Core error type for RL operations
#[derive(Error, Debug)]
pub enum RLError {
    /// Input has a rank or feature shape the operation does not accept
    #[error("Shape error: {0}")]
    Shape(String),

    /// Input has the wrong kind, e.g. a boolean mask or a scalar where a sequence is required
    #[error("Type error: {0}")]
    Type(String),

    /// Two aligned sequences differ in length
    #[error("Length mismatch: expected {expected}, got {actual}")]
    Length { expected: usize, actual: usize },

    /// A value lies outside its permitted domain
    #[error("Value error: {0}")]
    Value(String),

    /// Environment-related errors
    #[error("Environment error: {0}")]
    Environment(String),

    /// Agent-related errors
    #[error("Agent error: {0}")]
    Agent(String),

    /// Policy-related errors
    #[error("Policy error: {0}")]
    Policy(String),

    /// Invalid action
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RLError {
    /// Whether this error reports a violated input contract (shape, type, length or value)
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::Shape(_) | Self::Type(_) | Self::Length { .. } | Self::Value(_)
        )
    }
}

/// Result type alias for RL operations
pub type Result<T> = std::result::Result<T, RLError>;
