//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Only the
//! configuration paths (parameter validation, handler registration, descriptor
//! decoding) return these to callers; the event loops log and carry on.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the extension runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration supplied by the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed inbound event payload.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Hub HTTP transport errors.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection descriptor is not valid base64.
    #[error("decode error: {0}")]
    Decode(#[from] base64::DecodeError),
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn malformed_event(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors produced by caller-supplied configuration.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
