//! Error types for the telemetry agent
//!
//! Each layer owns its error enum (`ConfigError`, `SensorError`, `MqttError`);
//! this module aggregates the ones that can abort the agent.

use crate::config::ConfigError;
use crate::sensor::SensorError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Hardware unavailable: {message}")]
    Hardware { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AgentError {
    /// Create hardware error
    pub fn hardware<S: Into<String>>(message: S) -> Self {
        Self::Hardware {
            message: message.into(),
        }
    }

    /// Create connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Startup precondition failures that must stop the process
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, AgentError::Configuration(_) | AgentError::Hardware { .. })
    }
}

impl From<SensorError> for AgentError {
    fn from(error: SensorError) -> Self {
        match error {
            SensorError::HardwareUnavailable(message) => AgentError::hardware(message),
            other => AgentError::internal(other.to_string()),
        }
    }
}

impl From<MqttError> for AgentError {
    fn from(error: MqttError) -> Self {
        match error {
            MqttError::Credentials(config_error) => AgentError::Configuration(config_error),
            other => AgentError::connection(other.to_string()),
        }
    }
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;
