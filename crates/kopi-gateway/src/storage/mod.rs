//! Credential storage for the gateway
//!
//! This module provides a trait-based abstraction over the wallet that
//! holds organizational identities, with an in-memory backend for tests and
//! a filesystem backend for deployments.
//!
//! The filesystem backend is the one provisioning writes to:
//! - Identities survive gateway restarts
//! - Each identity is one file, written atomically
//! - A provisioning run wipes the wallet and rebuilds it from scratch

pub mod filesystem;
pub mod memory;

pub use filesystem::FileSystemStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use kopi_core::{Identity, IdentityKind};
use kopi_fabric::AuthContext;
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid identity name: {0:?}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No provider for identity kind {0}")]
    UnsupportedKind(IdentityKind),

    #[error("Identity '{name}' cannot authorize requests: {reason}")]
    Unauthorizable { name: String, reason: String },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<kopi_core::CoreError> for StorageError {
    fn from(err: kopi_core::CoreError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Identity names become file names, so keep them to a safe alphabet
pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

/// Storage backend trait for organizational identities
///
/// Implementations must be thread-safe. Writes are atomic per identity;
/// there is no coordination across identities beyond last-write-wins.
#[async_trait]
pub trait CredentialStore: Send + Sync + Debug {
    /// Get an identity by name
    async fn get(&self, name: &str) -> Result<Option<Identity>, StorageError>;

    /// Store an identity under its name
    async fn put(&self, identity: &Identity) -> Result<(), StorageError>;

    /// Remove every identity. Idempotent.
    async fn reset(&self) -> Result<(), StorageError>;

    /// List stored identity names
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Identity kinds this store can build execution contexts for
    fn providers(&self) -> Vec<IdentityKind> {
        vec![IdentityKind::X509]
    }

    /// Build the execution context used to authorize CA registrations
    async fn auth_context(&self, identity: &Identity) -> Result<AuthContext, StorageError> {
        if !self.providers().contains(&identity.kind()) {
            return Err(StorageError::UnsupportedKind(identity.kind()));
        }
        AuthContext::from_identity(identity).map_err(|e| StorageError::Unauthorizable {
            name: identity.name().to_string(),
            reason: e.to_string(),
        })
    }
}
