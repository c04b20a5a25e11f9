//! Token file storage operations.
//!
//! This module provides persistence for credential records:
//! - [`CredentialStore`] - Trait for credential storage operations
//! - [`FileCredentialStore`] - JSON file storage shared by many clients and processes
//!
//! Writes are serialized across processes with a [`LockManager`], re-read the
//! document under the lock, merge one record, and publish the result by
//! renaming a temporary sibling file over the token file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::store::error::StoreError;
use crate::store::lock::{Lock, LockManager, MarkerFileLocks};
use crate::store::types::{CredentialRecord, CredentialStoreDocument};

/// Trait for credential storage operations (enables mocking).
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Loads the record stored for `client_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the file or the entry is absent,
    /// and [`StoreError::Corrupted`] when the file cannot be parsed.
    fn load(&self, client_id: &str) -> Result<CredentialRecord, StoreError>;

    /// Inserts or replaces the record under its `client_id`.
    ///
    /// Records of other clients already in the file are preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired or the file cannot be
    /// written and published.
    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    /// Location of the backing file, for display.
    fn location(&self) -> String;
}

/// File-based credential storage.
#[derive(Debug, Clone)]
pub struct FileCredentialStore<L = MarkerFileLocks> {
    path: PathBuf,
    locks: L,
}

impl FileCredentialStore {
    /// Creates a store at `path` using marker-file locking.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_locks(path, MarkerFileLocks::default())
    }
}

impl<L: LockManager> FileCredentialStore<L> {
    /// Creates a store with a specific lock manager.
    #[must_use]
    pub fn with_locks(path: impl Into<PathBuf>, locks: L) -> Self {
        Self {
            path: path.into(),
            locks,
        }
    }

    /// Path of the token file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Reads the whole document; `Ok(None)` if the file does not exist.
    fn read_document(&self) -> Result<Option<CredentialStoreDocument>, StoreError> {
        let contents = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|source| StoreError::Corrupted {
                path: self.path.clone(),
                source,
            })
    }

    /// Ensure the directory holding the token file exists.
    fn ensure_parent(&self) -> Result<(), StoreError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))
            },
            _ => Ok(()),
        }
    }

    /// Merge and publish while holding the lock.
    fn save_locked(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        // Re-read under the lock: another process may have written since our last load.
        let mut document = match self.read_document() {
            Ok(doc) => doc.unwrap_or_default(),
            Err(StoreError::Corrupted { path, source }) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %source,
                    "token file is unreadable, starting a fresh document"
                );
                CredentialStoreDocument::default()
            },
            Err(e) => return Err(e),
        };

        document.merge(record.clone());

        let data = serde_json::to_vec_pretty(&document)?;
        self.publish(&data)
    }

    /// Write `data` to the temp sibling and rename it onto the token file.
    fn publish(&self, data: &[u8]) -> Result<(), StoreError> {
        let temp = self.temp_path();

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let written = options.open(&temp).and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        });
        if let Err(source) = written {
            let cleanup = fs::remove_file(&temp)
                .err()
                .filter(|e| e.kind() != std::io::ErrorKind::NotFound);
            if let Some(e) = &cleanup {
                tracing::warn!(path = %temp.display(), error = %e, "failed to remove temp file");
            }
            return Err(StoreError::WriteTemp {
                path: temp,
                source,
                cleanup,
            });
        }

        // The temp file may predate this write with wider permissions.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp, fs::Permissions::from_mode(0o600))
                .map_err(|e| StoreError::io(&temp, e))?;
        }

        if let Err(rename) = fs::rename(&temp, &self.path) {
            let cleanup = fs::remove_file(&temp).err();
            return Err(StoreError::Publish {
                path: self.path.clone(),
                rename,
                cleanup,
            });
        }

        Ok(())
    }
}

impl<L: LockManager> CredentialStore for FileCredentialStore<L> {
    fn load(&self, client_id: &str) -> Result<CredentialRecord, StoreError> {
        let not_found = || StoreError::NotFound {
            client_id: client_id.to_string(),
        };

        let document = self.read_document()?.ok_or_else(not_found)?;
        document.get(client_id).cloned().ok_or_else(not_found)
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.ensure_parent()?;

        let lock = self.locks.acquire(&self.path)?;
        let result = self.save_locked(record);

        if let Err(e) = lock.release() {
            tracing::warn!(error = %e, "failed to release token file lock");
        }

        if result.is_ok() {
            tracing::debug!(
                path = %self.path.display(),
                client_id = %record.client_id,
                "saved credentials"
            );
        }
        result
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
