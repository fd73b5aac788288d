//! Filesystem storage backend
//!
//! Persistent wallet implementation. Each identity lives in its own file
//! under the wallet directory:
//!
//! ```text
//! wallet/
//!   admin-petani.id
//!   PetaniUser.id
//!   ...
//! ```
//!
//! Files hold the wallet JSON produced by [`Identity::to_wallet_json`].
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never observes a partially written identity.

use async_trait::async_trait;
use kopi_core::Identity;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{validate_name, CredentialStore, StorageError};

const IDENTITY_EXTENSION: &str = "id";

/// Filesystem credential store
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    dir: PathBuf,
}

impl FileSystemStore {
    /// Open a wallet directory, creating it if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        info!(path = %dir.display(), "Opened filesystem wallet");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn identity_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, IDENTITY_EXTENSION))
    }
}

#[async_trait]
impl CredentialStore for FileSystemStore {
    async fn get(&self, name: &str) -> Result<Option<Identity>, StorageError> {
        validate_name(name)?;
        let path = self.identity_path(name);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let identity = Identity::from_wallet_json(name, &bytes)?;
        debug!(identity = %name, "Loaded identity from wallet");
        Ok(Some(identity))
    }

    async fn put(&self, identity: &Identity) -> Result<(), StorageError> {
        validate_name(identity.name())?;
        let contents = identity.to_wallet_json()?;

        let path = self.identity_path(identity.name());
        let staging = self
            .dir
            .join(format!(".{}.{}.tmp", identity.name(), uuid::Uuid::new_v4()));

        fs::write(&staging, &contents).await?;
        if let Err(e) = fs::rename(&staging, &path).await {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging file");
            }
            return Err(e.into());
        }

        info!(
            identity = %identity.name(),
            msp_id = %identity.msp_id(),
            path = %path.display(),
            "Stored identity"
        );
        Ok(())
    }

    async fn reset(&self) -> Result<(), StorageError> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.dir).await?;
        info!(path = %self.dir.display(), "Wiped filesystem wallet");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(IDENTITY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, msp_id: &str) -> Identity {
        Identity::new(name, msp_id, "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n", "KEY")
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::open(dir.path()).await.unwrap();

        let original = identity("PetaniUser", "PetaniMSP");
        store.put(&original).await.unwrap();

        assert!(dir.path().join("PetaniUser.id").exists());
        assert_eq!(store.get("PetaniUser").await.unwrap(), Some(original));
        assert!(store.get("LogistikUser").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileSystemStore::open(dir.path()).await.unwrap();
            store.put(&identity("admin-koperasi", "KoperasiMSP")).await.unwrap();
        }

        let reopened = FileSystemStore::open(dir.path()).await.unwrap();
        let loaded = reopened.get("admin-koperasi").await.unwrap().unwrap();
        assert_eq!(loaded.msp_id(), "KoperasiMSP");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::open(dir.path()).await.unwrap();

        store.put(&identity("PetaniUser", "PetaniMSP")).await.unwrap();
        store.put(&identity("PetaniUser", "OtherMSP")).await.unwrap();

        let loaded = store.get("PetaniUser").await.unwrap().unwrap();
        assert_eq!(loaded.msp_id(), "OtherMSP");
        assert_eq!(store.list().await.unwrap(), vec!["PetaniUser"]);
    }

    #[tokio::test]
    async fn test_reset_wipes_and_recreates() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = dir.path().join("wallet");
        let store = FileSystemStore::open(&wallet).await.unwrap();

        store.put(&identity("PetaniUser", "PetaniMSP")).await.unwrap();
        store.put(&identity("LogistikUser", "LogistikMSP")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        store.reset().await.unwrap();
        assert!(wallet.is_dir());
        assert!(store.list().await.unwrap().is_empty());

        // Second reset on an already empty wallet
        store.reset().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::open(dir.path()).await.unwrap();
        store.put(&identity("PetaniUser", "PetaniMSP")).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join(".PetaniUser.partial.id"), b"{}").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["PetaniUser"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("PetaniUser.id"), b"not json").unwrap();

        assert!(matches!(
            store.get("PetaniUser").await,
            Err(StorageError::Serialization(_))
        ));
    }
}
