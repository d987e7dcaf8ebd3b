//! Error types for the delivery core.
//!

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    /// Local state makes the requested delivery unsafe (duplicate hard stage,
    /// nothing to deliver, staged count mismatch)
    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),
    /// A conflicting delivery is already running
    #[error("Delivery interrupted: {0}")]
    InterruptedDelivery(String),
    #[error("Remote service error: {0}")]
    RemoteServiceError(String),
    #[error("Tool invocation error: {0}")]
    ToolInvocationError(String),
    #[error("Incompatible transfer tool version {found}, required {required}")]
    IncompatibleToolVersion { found: String, required: String },
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl DeliveryError {
    /// Errors raised while talking to the transfer tool end the monitor process
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::ToolInvocationError(_) | Self::IncompatibleToolVersion { .. }
        )
    }
}

impl From<std::io::Error> for DeliveryError {
    fn from(error: std::io::Error) -> Self {
        DeliveryError::IoError(error.to_string())
    }
}

impl From<walkdir::Error> for DeliveryError {
    fn from(error: walkdir::Error) -> Self {
        DeliveryError::IoError(error.to_string())
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(error: reqwest::Error) -> Self {
        DeliveryError::RemoteServiceError(error.to_string())
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(error: serde_json::Error) -> Self {
        DeliveryError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for DeliveryError {
    fn from(error: config::ConfigError) -> Self {
        DeliveryError::ConfigurationError(error.to_string())
    }
}

impl From<crate::config::ConfigurationError> for DeliveryError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        DeliveryError::ConfigurationError(error.to_string())
    }
}

pub type DeliveryResult<T> = std::result::Result<T, DeliveryError>;
