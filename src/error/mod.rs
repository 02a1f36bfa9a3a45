//! Error types for weft.

pub mod auth;
pub mod describe;

pub use auth::{is_authentication_error, remediation_actions};
pub use describe::describe_error;

use thiserror::Error;

/// Primary error type for all weft operations.
#[derive(Error, Debug)]
pub enum WeftError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("A request is already in flight for session {0}")]
    Busy(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Broad error category, following the orchestrator's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The model call failed; the turn ends with an error message.
    StreamTerminal,
    /// A stream-terminal error caused by missing or rejected credentials.
    Authentication,
    /// Recorded as an error tool result; the turn continues.
    Tool,
    /// Broken call/result pairing; repaired silently.
    History,
    /// Not a failure: the user stopped the request.
    Cancellation,
    Configuration,
    Storage,
}

impl WeftError {
    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Model(message) | Self::Stream(message) => {
                if is_authentication_error(message) {
                    ErrorCategory::Authentication
                } else {
                    ErrorCategory::StreamTerminal
                }
            }
            Self::ToolExecution { .. } | Self::ToolNotFound(_) => ErrorCategory::Tool,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::Busy(_) => ErrorCategory::Configuration,
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Serialization(_) => ErrorCategory::StreamTerminal,
            Self::InvalidState(_) => ErrorCategory::History,
        }
    }

    /// Whether this is the distinguished cancellation condition.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the error ends the current turn when it reaches the stream loop.
    pub fn is_stream_terminal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::StreamTerminal | ErrorCategory::Authentication
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, WeftError>;
