//! JSON file backed secret store.
//!
//! The whole state lives in one small file, rewritten atomically through a
//! temporary sibling and a rename. On unix the file is created with mode 0600
//! so only the owning identity can read it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::secret::Secret;
use crate::store::{SecretStore, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    current: Option<Secret>,
    #[serde(default)]
    pending: Option<Secret>,
}

/// Secret store persisted to a local JSON file.
pub struct FileSecretStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an initial current value if the file does not exist yet.
    pub async fn seed(&self, secret: Secret) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
        {
            return Ok(false);
        }
        self.write(&StoreFile {
            current: Some(secret),
            pending: None,
        })
        .await?;
        Ok(true)
    }

    /// Read the file. A missing file is `NotFound`: the store was never
    /// provisioned at this path.
    async fn read(&self) -> Result<StoreFile, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                // serde_json errors carry positions, not content.
                StoreError::Corrupt(e.to_string())
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::Unavailable(e.to_string())),
        }
    }

    /// Read for a write cycle, where a missing file starts out empty.
    async fn read_for_update(&self) -> Result<StoreFile, StoreError> {
        match self.read().await {
            Err(StoreError::NotFound) => Ok(StoreFile::default()),
            other => other,
        }
    }

    async fn write(&self, state: &StoreFile) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec_pretty(state).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_current(&self) -> Result<Secret, StoreError> {
        self.read().await?.current.ok_or(StoreError::NotFound)
    }

    async fn get_pending(&self) -> Result<Option<Secret>, StoreError> {
        Ok(self.read().await?.pending)
    }

    async fn set_pending(&self, secret: Secret) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.read_for_update().await?;
        if state.pending.is_some() {
            return Err(StoreError::PendingExists);
        }
        state.pending = Some(secret);
        self.write(&state).await
    }

    async fn promote_pending(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.read_for_update().await?;
        let pending = state.pending.take().ok_or(StoreError::NoPending)?;
        state.current = Some(pending);
        self.write(&state).await
    }

    async fn discard_pending(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.read_for_update().await?;
        if state.pending.take().is_none() {
            return Ok(());
        }
        self.write(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.json");

        let store = FileSecretStore::new(&path);
        assert!(matches!(store.get_current().await, Err(StoreError::NotFound)));
        assert!(store.seed(Secret::new("abc123")).await.unwrap());
        assert!(!store.seed(Secret::new("ignored")).await.unwrap());
        store.set_pending(Secret::new("xyz789")).await.unwrap();

        let reopened = FileSecretStore::new(&path);
        assert_eq!(reopened.get_current().await.unwrap().expose(), "abc123");
        assert_eq!(
            reopened.get_pending().await.unwrap().unwrap().expose(),
            "xyz789"
        );

        reopened.promote_pending().await.unwrap();
        assert_eq!(store.get_current().await.unwrap().expose(), "xyz789");
        assert!(store.get_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.get_current().await, Err(StoreError::NotFound)));
        assert!(matches!(store.get_pending().await, Err(StoreError::NotFound)));

        // Writes still create the file.
        store.set_pending(Secret::new("xyz789")).await.unwrap();
        assert_eq!(store.get_pending().await.unwrap().unwrap().expose(), "xyz789");
        assert!(matches!(store.get_current().await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_discard_pending_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("secret.json"));
        store.seed(Secret::new("abc123")).await.unwrap();
        store.discard_pending().await.unwrap();
        store.set_pending(Secret::new("xyz789")).await.unwrap();
        store.discard_pending().await.unwrap();
        assert!(store.get_pending().await.unwrap().is_none());
        assert_eq!(store.get_current().await.unwrap().expose(), "abc123");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let store = FileSecretStore::new(&path);
        assert!(matches!(store.get_current().await, Err(StoreError::Corrupt(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.json");
        let store = FileSecretStore::new(&path);
        store.seed(Secret::new("abc123")).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
