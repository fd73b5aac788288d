//! Error types shared across the gateway

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while resolving organizations, descriptors and identities
#[derive(Error, Debug)]
pub enum CoreError {
    /// Identity name is not one of the five known application users
    #[error("Unrecognized identity: {0}")]
    UnrecognizedIdentity(String),

    /// Connection descriptor file does not exist
    #[error("Connection descriptor not found at {}", .0.display())]
    DescriptorMissing(PathBuf),

    /// Connection descriptor exists but could not be read
    #[error("Failed to read connection descriptor {}: {reason}", path.display())]
    DescriptorUnreadable { path: PathBuf, reason: String },

    /// Connection descriptor is not valid JSON or has the wrong shape
    #[error("Invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    /// Connection descriptor lists no certificate authority
    #[error("Connection descriptor has no certificate authority entry")]
    NoCertificateAuthority,

    /// Connection descriptor lists no peer
    #[error("Connection descriptor has no peer entry")]
    NoPeer,

    /// Stored identity is malformed
    #[error("Invalid identity '{name}': {reason}")]
    InvalidIdentity { name: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}
