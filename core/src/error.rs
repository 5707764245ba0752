//! Error types for the SDK.
//!
//! # Design
//! Validation failures (`InvalidResourceSpec`, `InvalidHeader`) surface
//! synchronously at the call site. Everything that happens after a request is
//! issued travels through the request's shared result, which hands a clone of
//! the same error to every observer, so `SdkError` is `Clone` and carries
//! rendered messages rather than source errors.
//!
//! Status codes are not interpreted: a 404 or 500 is a successful round-trip
//! as far as `Transport` is concerned. Only login inspects the status and maps
//! rejections to `Authentication`.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SdkError {
    /// A resource specification is missing its identifying field or names an
    /// unknown HTTP method.
    #[error("invalid resource spec: {0}")]
    InvalidResourceSpec(String),

    /// A header name or value was rejected.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The HTTP round-trip itself failed (connection, I/O, runtime).
    #[error("transport error: {0}")]
    Transport(String),

    /// The login call was rejected by the server.
    #[error("authentication failed (HTTP {status}): {message}")]
    Authentication { status: u16, message: String },

    /// A payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A response body could not be decoded.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SdkError {
    pub(crate) fn invalid_spec(msg: impl Into<String>) -> Self {
        SdkError::InvalidResourceSpec(msg.into())
    }
}
