//! Error types for the test engine
//!
//! Every failure that can end a test case is a variant here. Leaf actions
//! wrap their failure in [`Error::ActionFailed`] so the report names the
//! action; containers propagate errors unchanged.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::endpoint::EndpointError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the test engine
#[derive(Error, Debug)]
pub enum Error {
    // === Variable Errors ===
    #[error("Unknown variable '{name}'")]
    UnknownVariable { name: String },

    #[error("Invalid variable name '{0}'")]
    InvalidVariableName(String),

    #[error("Cyclic variable resolution: {chain}")]
    CyclicResolution { chain: String },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Function '{function}' failed: {reason}")]
    FunctionFailed { function: String, reason: String },

    // === Message Construction Errors ===
    #[error("Invalid typed header value '{value}': {reason}")]
    InvalidHeaderType { value: String, reason: String },

    #[error("Failed to build message content: {source}")]
    MessageConstructionFailed {
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid {message_type} payload: {reason}")]
    InvalidPayload { message_type: String, reason: String },

    // === Validation Errors ===
    #[error("Invalid path expression '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid validation matcher '{expression}': {reason}")]
    InvalidMatcher { expression: String, reason: String },

    #[error("Validation failed at '{path}': expected '{expected}' but was '{actual}'")]
    ValidationFailed {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Element count mismatch at '{path}': expected {expected} but was {actual}")]
    ElementCountMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("No validator registered for message type '{0}'")]
    UnsupportedMessageType(String),

    // === Action Errors ===
    #[error("Invalid condition '{expression}': {reason}")]
    InvalidCondition { expression: String, reason: String },

    #[error("Correlation key '{0}' is not set")]
    MissingCorrelationKey(String),

    #[error("Timed out after {}ms waiting for message with correlation key '{key}'", .timeout.as_millis())]
    CorrelationTimeout { key: String, timeout: Duration },

    #[error("Failed to send message via '{endpoint}': {source}")]
    Send {
        endpoint: String,
        #[source]
        source: EndpointError,
    },

    #[error("Failed to receive message from '{endpoint}': {source}")]
    Receive {
        endpoint: String,
        #[source]
        source: EndpointError,
    },

    #[error("Action '{action}' failed: {source}")]
    ActionFailed {
        action: String,
        #[source]
        source: Box<Error>,
    },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation failure for a path
    pub fn validation_failed(path: &str, expected: &str, actual: &str) -> Self {
        Self::ValidationFailed {
            path: path.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an element count mismatch
    pub fn count_mismatch(path: &str, expected: usize, actual: usize) -> Self {
        Self::ElementCountMismatch {
            path: path.to_string(),
            expected,
            actual,
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an invalid payload error
    pub fn invalid_payload(message_type: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidPayload {
            message_type: message_type.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wrap a failure raised while building a message
    pub fn construction(source: Error) -> Self {
        match source {
            already @ Self::MessageConstructionFailed { .. } => already,
            other => Self::MessageConstructionFailed {
                source: Box::new(other),
            },
        }
    }

    /// Attach the failing action's name
    pub fn in_action(action: &str, source: Error) -> Self {
        Self::ActionFailed {
            action: action.to_string(),
            source: Box::new(source),
        }
    }

    /// Strip action and construction wrappers to get the underlying failure
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::ActionFailed { source, .. } | Self::MessageConstructionFailed { source } => {
                source.root_cause()
            }
            other => other,
        }
    }

    /// Whether this failure came from payload or header validation
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::ValidationFailed { .. } | Self::ElementCountMismatch { .. }
        )
    }
}
