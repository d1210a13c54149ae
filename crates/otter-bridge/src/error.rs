//! Error types for otter-bridge
//!
//! Wraps engine-host errors and adds the faults raised by the bridge itself.

use std::sync::Arc;
use thiserror::Error;

use otter_host::EngineId;

// Re-export host error types
pub use otter_host::{HostError, HostResult};

/// Errors that can occur during bridge operations
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// Engine-host error, including script exceptions
    #[error(transparent)]
    Host(#[from] HostError),

    /// Operation on a proxy that has been disposed
    #[error("Cannot access a disposed object")]
    Disposed,

    /// Wrong number of indexer or call arguments
    #[error("Invalid argument or index count: expected {expected}, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    /// Offset or index at or beyond the addressed size
    #[error("Offset {offset} is out of range for size {size}")]
    OutOfRange { offset: usize, size: usize },

    /// Host buffer too small for the transfer
    #[error("Insufficient space: need {needed}, available {available}")]
    InsufficientSpace { needed: usize, available: usize },

    /// Engine lacks promise support
    #[error("{engine} does not support promises (language version {version})")]
    PromisesNotSupported { engine: String, version: u32 },

    /// Value is not a promise
    #[error("Object is not a promise")]
    NotAPromise,

    /// Host task was cancelled before it completed
    #[error("The operation was cancelled")]
    Cancelled,

    /// Second attempt to settle a one-shot completion
    #[error("Completion has already been settled")]
    AlreadySettled,

    /// Missing key in an associative lookup
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Proxy belongs to a different engine than the one addressed
    #[error("Proxy belongs to {actual}, not {expected}")]
    ForeignEngine { expected: EngineId, actual: EngineId },

    /// Async runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl BridgeError {
    /// Create a script error from error type and message
    pub fn script_error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Host(HostError::script_error(error_type, message))
    }

    /// Create a type error
    pub fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Host(HostError::type_error(expected, actual))
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Check if this wraps a script exception
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::Host(e) if e.is_script_error())
    }

    /// Whether the failing call had already entered script code
    pub fn execution_started(&self) -> bool {
        matches!(self, Self::Host(e) if e.execution_started())
    }

    /// Script-visible error name for this error
    pub fn error_type(&self) -> &str {
        match self {
            Self::Host(e) => e.error_type(),
            Self::Cancelled => "AbortError",
            Self::OutOfRange { .. } | Self::InsufficientSpace { .. } => "RangeError",
            Self::Disposed | Self::NotAPromise | Self::ArgumentCount { .. } => "TypeError",
            _ => "Error",
        }
    }

    /// Convert to an error the engine can throw
    ///
    /// Script errors pass through unchanged so their structure survives
    /// nested engines. Anything else becomes a script error whose cause is
    /// the original.
    pub fn into_host_error(self) -> HostError {
        match self {
            Self::Host(e) if e.is_script_error() => e,
            other => {
                let name = other.error_type().to_string();
                let message = other.to_string();
                HostError::script_error_with_cause(name, message, Arc::new(other))
            }
        }
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
