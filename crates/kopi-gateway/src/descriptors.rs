//! Connection descriptor loading with a parse cache
//!
//! Descriptors are static files generated alongside the network, so their
//! parsed form is cached. Presence is still checked on every load: deleting
//! a descriptor takes an organization offline immediately.

use kopi_core::{ConnectionDescriptor, CoreError};
use moka::future::Cache;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TTL: Duration = Duration::from_secs(300);
const MAX_ENTRIES: u64 = 64;

/// Loads and caches parsed connection descriptors
#[derive(Clone)]
pub struct DescriptorLoader {
    cache: Cache<PathBuf, Arc<ConnectionDescriptor>>,
}

impl std::fmt::Debug for DescriptorLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorLoader")
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}

impl Default for DescriptorLoader {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl DescriptorLoader {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Load the descriptor at `path`
    ///
    /// Fails with [`CoreError::DescriptorMissing`] when the file is absent,
    /// even if an earlier parse is cached.
    pub async fn load(&self, path: &Path) -> Result<Arc<ConnectionDescriptor>, CoreError> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => return Err(CoreError::DescriptorMissing(path.to_path_buf())),
            Err(e) => {
                return Err(CoreError::DescriptorUnreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }

        if let Some(descriptor) = self.cache.get(path).await {
            return Ok(descriptor);
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::DescriptorUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let descriptor = Arc::new(ConnectionDescriptor::parse(&raw)?);

        debug!(path = %path.display(), "Parsed connection descriptor");
        self.cache.insert(path.to_path_buf(), descriptor.clone()).await;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"{
        "name": "fablo-test-network-petani",
        "version": "1.0.0",
        "certificateAuthorities": {
            "ca.petani.example.com": { "url": "http://localhost:7020" }
        }
    }"#;

    #[tokio::test]
    async fn test_load_upgrades_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connection-profile-petani.json");
        std::fs::write(&path, DESCRIPTOR).unwrap();

        let loader = DescriptorLoader::default();
        let first = loader.load(&path).await.unwrap();
        assert_eq!(first.first_authority().unwrap().url, "https://localhost:7020");

        let second = loader.load(&path).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_missing_file_wins_over_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connection-profile-petani.json");
        std::fs::write(&path, DESCRIPTOR).unwrap();

        let loader = DescriptorLoader::default();
        loader.load(&path).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            loader.load(&path).await,
            Err(CoreError::DescriptorMissing(p)) if p == path
        ));
    }

    #[tokio::test]
    async fn test_expired_entry_is_parsed_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connection-profile-petani.json");
        std::fs::write(&path, DESCRIPTOR).unwrap();

        let loader = DescriptorLoader::new(Duration::from_millis(50));
        loader.load(&path).await.unwrap();

        std::fs::write(&path, DESCRIPTOR.replace("7020", "7030")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let reloaded = loader.load(&path).await.unwrap();
        assert_eq!(reloaded.first_authority().unwrap().url, "https://localhost:7030");
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connection-profile-petani.json");
        std::fs::write(&path, "{ nope").unwrap();

        let loader = DescriptorLoader::default();
        assert!(matches!(
            loader.load(&path).await,
            Err(CoreError::InvalidDescriptor(_))
        ));
    }
}
