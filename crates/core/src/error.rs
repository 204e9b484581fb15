//! Error types for Stagehand

use thiserror::Error;

/// Result type alias using Stagehand Error
pub type Result<T> = std::result::Result<T, Error>;

/// Stagehand error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol violation: received {event}, expected {expected}")]
    ProtocolViolation { event: String, expected: String },

    #[error("Outstanding async operations after {timeout_ms}ms: {}", .descriptions.join(", "))]
    OutstandingAsyncOperations {
        timeout_ms: u64,
        descriptions: Vec<String>,
    },

    #[error("Reporter error: {0}")]
    Reporter(String),

    #[error("Lifecycle hook error: {0}")]
    Hook(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),
}

impl Error {
    /// Build a protocol violation naming the offending event and what should have preceded it
    pub fn protocol(event: impl Into<String>, expected: impl Into<String>) -> Self {
        Error::ProtocolViolation {
            event: event.into(),
            expected: expected.into(),
        }
    }

    /// Whether this error means the run's event stream can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation { .. } | Error::OutstandingAsyncOperations { .. }
        )
    }
}
