//! Error types for Agenticlaw

use thiserror::Error;

/// Category of a runtime error, independent of its message text.
///
/// Callers match on this instead of inspecting the error string, so
/// recoverable conditions (timeout, cancelled, denied) can be handled
/// uniformly across tool calls, mini-agents, and plan steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Denied,
    NotFound,
    Timeout,
    Cancelled,
    Capacity,
    UpstreamFailure,
    ToolFailure,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Denied => "denied",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Capacity => "capacity",
            Self::UpstreamFailure => "upstream_failure",
            Self::ToolFailure => "tool_failure",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("llm error: {provider} - {message}")]
    LlmError { provider: String, message: String },

    #[error("tool error: {name} - {message}")]
    ToolError { name: String, message: String },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),

    /// A taxonomy-classified runtime failure: invalid args, denied approval,
    /// not-found lookups, timeouts, cancellation, capacity limits, and
    /// upstream-dependency failures all surface through this variant so
    /// `kind()` gives callers a single match point.
    #[error("{kind}: {message}")]
    Runtime { kind: ErrorKind, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self::AuthFailed {
            reason: reason.into(),
        }
    }

    pub fn llm_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn tool_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolError {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Runtime {
            kind,
            message: message.into(),
        }
    }

    /// The taxonomy category of this error, for callers that need to branch
    /// on kind rather than match the full variant (e.g. "retry on timeout").
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Runtime { kind, .. } => *kind,
            Self::IoError(_) | Self::JsonError(_) | Self::Internal(_) => ErrorKind::Internal,
            Self::SessionNotFound(_) | Self::MethodNotFound(_) => ErrorKind::NotFound,
            Self::AuthFailed { .. } => ErrorKind::Denied,
            Self::ToolError { .. } => ErrorKind::ToolFailure,
            Self::ConnectionClosed(_) | Self::InvalidMessage(_) | Self::ConfigError(_) => {
                ErrorKind::InvalidArgument
            }
            Self::LlmError { .. } => ErrorKind::Internal,
        }
    }
}
