//! Error taxonomy for the planner core.

use std::time::Duration;
use thiserror::Error;

/// Stable machine-readable error codes, as carried in [`crate::protocol::ErrorBody`].
pub mod codes {
    pub const NOT_INITIALIZED: &str = "NOT_INITIALIZED";
    pub const UNSUPPORTED_PROVIDER: &str = "UNSUPPORTED_PROVIDER";
    pub const UNSUPPORTED_PATTERN: &str = "UNSUPPORTED_PATTERN";
    pub const INVALID_STRUCTURE: &str = "INVALID_STRUCTURE";
    pub const INVALID_KEYFRAME: &str = "INVALID_KEYFRAME";
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CANCELLED: &str = "CANCELLED";
    pub const PERSISTENCE_ERROR: &str = "PERSISTENCE_ERROR";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
}

#[derive(Debug, Error)]
pub enum PlannerError {
    /// The engine was used before `initialize`.
    #[error("Path engine is not initialized")]
    NotInitialized,

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Unsupported pattern: {0}")]
    UnsupportedPattern(String),

    /// Backend response is missing keyframes or has none.
    #[error("Invalid path structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid keyframe at index {index}: {reason}")]
    InvalidKeyframe { index: usize, reason: String },

    /// Wrapped backend failure.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Path generation was cancelled")]
    Cancelled,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PlannerError {
    pub fn code(&self) -> &'static str {
        match self {
            PlannerError::NotInitialized => codes::NOT_INITIALIZED,
            PlannerError::UnsupportedProvider(_) => codes::UNSUPPORTED_PROVIDER,
            PlannerError::UnsupportedPattern(_) => codes::UNSUPPORTED_PATTERN,
            PlannerError::InvalidStructure(_) => codes::INVALID_STRUCTURE,
            PlannerError::InvalidKeyframe { .. } => codes::INVALID_KEYFRAME,
            PlannerError::Provider(_) => codes::PROVIDER_ERROR,
            PlannerError::Timeout(_) => codes::TIMEOUT,
            PlannerError::Cancelled => codes::CANCELLED,
            PlannerError::Persistence(_) => codes::PERSISTENCE_ERROR,
            PlannerError::Config(_) => codes::CONFIG_ERROR,
            PlannerError::Serialization(_) => codes::SERIALIZATION_ERROR,
        }
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn invalid_keyframe(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidKeyframe {
            index,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PlannerError {
    fn from(err: serde_json::Error) -> Self {
        PlannerError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for PlannerError {
    fn from(err: config::ConfigError) -> Self {
        PlannerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;
