//! Error types for the gather engine.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context. Soft outcomes (a correlated response that never arrived, an auth
//! code nobody requested) are *not* errors: they surface as `None`/`false`
//! results; the variants here cover genuine failures.
//!
//! ## Error Categories
//!
//! - **Wire errors**: truncated or oversized frames, invalid UTF-32 strings
//! - **Connection errors**: socket establishment, login, initialization probe
//! - **State errors**: operations issued against the wrong gather state
//! - **Matchmaker errors**: precondition violations (odd/empty roster)
//! - **Store errors**: failures reported by the external persistence layer

use std::time::Duration;
use thiserror::Error;

/// Result type alias for gather operations.
pub type Result<T, E = GatherError> = std::result::Result<T, E>;

/// Main error type for the gather engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatherError {
    #[error("malformed frame in {context}: {details}")]
    MalformedFrame { context: String, details: String },

    #[error("frame too large: {size} bytes exceeds the u16 length prefix")]
    FrameTooLarge { size: usize },

    #[error("failed to connect to game server: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("login rejected by server: {reason}")]
    LoginRejected { reason: String },

    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("invalid gather state: {details}")]
    State { details: String },

    #[error("matchmaker precondition violated: {reason}")]
    Matchmaker { reason: String },

    #[error("store operation failed: {context}")]
    Store {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GatherError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Wire, state, and matchmaker errors are deterministic and will fail the
    /// same way again; connection-level failures may clear up on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatherError::Connection { .. } => true,
            GatherError::Timeout { .. } => true,
            GatherError::Io { .. } => true,
            GatherError::Store { .. } => true,
            GatherError::MalformedFrame { .. } => false,
            GatherError::FrameTooLarge { .. } => false,
            GatherError::LoginRejected { .. } => false,
            GatherError::State { .. } => false,
            GatherError::Matchmaker { .. } => false,
        }
    }

    /// Helper constructor for malformed-frame errors with parse context.
    pub fn malformed_frame(context: impl Into<String>, details: impl Into<String>) -> Self {
        GatherError::MalformedFrame { context: context.into(), details: details.into() }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        GatherError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        GatherError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for gather state errors.
    pub fn state(details: impl Into<String>) -> Self {
        GatherError::State { details: details.into() }
    }

    /// Helper constructor for matchmaker precondition errors.
    pub fn matchmaker(reason: impl Into<String>) -> Self {
        GatherError::Matchmaker { reason: reason.into() }
    }

    /// Helper constructor for store errors.
    pub fn store_error(context: impl Into<String>) -> Self {
        GatherError::Store { context: context.into(), source: None }
    }

    /// Helper constructor for I/O errors with operation context.
    pub fn io_error(context: impl Into<String>, source: std::io::Error) -> Self {
        GatherError::Io { context: context.into(), source }
    }
}

impl From<std::io::Error> for GatherError {
    fn from(err: std::io::Error) -> Self {
        GatherError::Io { context: "<unknown>".to_string(), source: err }
    }
}
