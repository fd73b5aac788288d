//! In-memory storage backend
//!
//! Suitable for tests and throwaway gateways. Data is lost on restart.

use async_trait::async_trait;
use kopi_core::Identity;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use super::{validate_name, CredentialStore, StorageError};

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: RwLock<HashMap<String, Identity>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with identities
    pub fn with_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        let map = identities
            .into_iter()
            .map(|identity| (identity.name().to_string(), identity))
            .collect();
        Self {
            identities: RwLock::new(map),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<Identity>, StorageError> {
        let identities = self.identities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(identities.get(name).cloned())
    }

    async fn put(&self, identity: &Identity) -> Result<(), StorageError> {
        validate_name(identity.name())?;
        let mut identities = self.identities.write().unwrap_or_else(PoisonError::into_inner);
        info!(identity = %identity.name(), msp_id = %identity.msp_id(), "Stored identity");
        identities.insert(identity.name().to_string(), identity.clone());
        Ok(())
    }

    async fn reset(&self) -> Result<(), StorageError> {
        let mut identities = self.identities.write().unwrap_or_else(PoisonError::into_inner);
        let removed = identities.len();
        identities.clear();
        info!(removed, "Wiped credential store");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let identities = self.identities.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = identities.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
