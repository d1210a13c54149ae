//! Error types for engine-host operations
//!
//! Script exceptions are surfaced as [`HostError::Script`], which keeps the
//! structured details of the thrown value (error name, message, stack) and,
//! when the exception started life as a host-side failure, the original host
//! error as its `cause`.

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for engine-host operations
pub type HostResult<T> = Result<T, HostError>;

/// Shared, cloneable error cause carried through the engine
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Structured error types for engine-host operations
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// Exception thrown by script code (or re-raised from a thrown value)
    #[error("{name}: {message}")]
    Script {
        name: String,
        message: String,
        stack: Option<String>,
        /// Whether control had already entered script code when the error was raised
        execution_started: bool,
        #[source]
        cause: Option<ErrorCause>,
    },

    /// Type conversion error
    #[error("Type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    /// Handle unknown to the engine (already released or from another engine)
    #[error("Invalid handle: {0}")]
    InvalidHandle(u64),

    /// Array buffer or view access error
    #[error("Buffer error: {0}")]
    Buffer(String),

    /// Capability not provided by this engine
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// Internal/unexpected error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostError {
    /// Create a script error from error name and message
    pub fn script_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            name: name.into(),
            message: message.into(),
            stack: None,
            execution_started: true,
            cause: None,
        }
    }

    /// Create a script error that keeps `cause` as its source
    pub fn script_error_with_cause(
        name: impl Into<String>,
        message: impl Into<String>,
        cause: ErrorCause,
    ) -> Self {
        Self::Script {
            name: name.into(),
            message: message.into(),
            stack: None,
            execution_started: true,
            cause: Some(cause),
        }
    }

    /// Create a type error
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeError {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a user-facing script error
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::Script { .. })
    }

    /// Whether script execution had started when this error was raised
    ///
    /// Only script errors can report `true`.
    pub fn execution_started(&self) -> bool {
        matches!(
            self,
            Self::Script {
                execution_started: true,
                ..
            }
        )
    }

    /// Mark a script error as raised before execution started
    pub fn before_execution(self) -> Self {
        match self {
            Self::Script {
                name,
                message,
                stack,
                cause,
                ..
            } => Self::Script {
                name,
                message,
                stack,
                execution_started: false,
                cause,
            },
            other => other,
        }
    }

    /// Get the stack trace if available
    pub fn stack_trace(&self) -> Option<&str> {
        match self {
            Self::Script { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }

    /// Get the wrapped host cause, if any
    pub fn cause(&self) -> Option<&ErrorCause> {
        match self {
            Self::Script { cause, .. } => cause.as_ref(),
            _ => None,
        }
    }

    /// Get the error type name (e.g., "TypeError", "RangeError")
    pub fn error_type(&self) -> &str {
        match self {
            Self::Script { name, .. } => name,
            Self::TypeError { .. } => "TypeError",
            Self::InvalidHandle(_) => "InvalidHandleError",
            Self::Buffer(_) => "RangeError",
            Self::NotSupported(_) => "NotSupportedError",
            Self::Json(_) => "JsonError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Message without the error type prefix
    pub fn message(&self) -> String {
        match self {
            Self::Script { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for HostError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = HostError::script_error("TypeError", "undefined is not a function");
        assert_eq!(err.to_string(), "TypeError: undefined is not a function");
        assert!(err.is_script_error());
        assert!(err.execution_started());
    }

    #[test]
    fn test_before_execution() {
        let err = HostError::script_error("Error", "boom").before_execution();
        assert!(err.is_script_error());
        assert!(!err.execution_started());
    }

    #[test]
    fn test_cause_is_source() {
        let inner = HostError::internal("inner failure");
        let err = HostError::script_error_with_cause("Error", "outer", Arc::new(inner));

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Internal error: inner failure");
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_type_error() {
        let err = HostError::type_error("function", "number");
        assert!(err.to_string().contains("expected function"));
        assert_eq!(err.error_type(), "TypeError");
        assert!(!err.execution_started());
    }

    #[test]
    fn test_message_strips_prefix() {
        let err = HostError::script_error("RangeError", "too far");
        assert_eq!(err.message(), "too far");
        assert!(err.stack_trace().is_none());
    }

    #[test]
    fn test_error_type_names() {
        assert_eq!(HostError::InvalidHandle(3).error_type(), "InvalidHandleError");
        assert_eq!(HostError::Buffer("detached".into()).error_type(), "RangeError");
        assert_eq!(HostError::NotSupported("x".into()).error_type(), "NotSupportedError");
        assert_eq!(HostError::internal("x").message(), "Internal error: x");
    }
}
