//! Token store error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the token store and its lock manager.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The document has no record for this client, or does not exist yet.
    #[error("No stored credentials for client '{client_id}'.")]
    NotFound {
        /// The client identity that was looked up.
        client_id: String,
    },

    /// The token file exists but could not be parsed.
    #[error("Token file {path} is corrupted: {source}")]
    Corrupted {
        /// Path of the unreadable document.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// Another writer held the lock for the whole retry budget.
    #[error("Timed out after {waited:?} waiting for lock file {path}. Another process may be writing the token file.")]
    LockTimeout {
        /// Path of the lock marker.
        path: PathBuf,
        /// Total time spent waiting.
        waited: Duration,
    },

    /// A stale lock marker could not be removed.
    #[error("Failed to remove stale lock file {path}: {source}")]
    StaleLock {
        /// Path of the lock marker.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// Lock marker could not be created or removed.
    #[error("Lock file {path}: {source}")]
    Lock {
        /// Path of the lock marker.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the token file failed.
    #[error("Token file {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// The temporary file could not be written.
    ///
    /// `cleanup` carries the failure to remove the partial temporary file, if any.
    #[error("Failed to write temp file {path}: {source}{}", cleanup.as_ref().map(|e| format!("; additionally failed to remove it: {e}")).unwrap_or_default())]
    WriteTemp {
        /// Temporary file path.
        path: PathBuf,
        /// The write failure.
        #[source]
        source: std::io::Error,
        /// The temp-file removal failure.
        cleanup: Option<std::io::Error>,
    },

    /// The temporary file could not be renamed onto the token file.
    ///
    /// `cleanup` carries the failure to remove the temporary file, if any.
    #[error("Failed to publish token file {path}: {rename}{}", cleanup.as_ref().map(|e| format!("; additionally failed to remove temp file: {e}")).unwrap_or_default())]
    Publish {
        /// Canonical token file path.
        path: PathBuf,
        /// The rename failure.
        #[source]
        rename: std::io::Error,
        /// The temp-file removal failure.
        cleanup: Option<std::io::Error>,
    },

    /// Serializing the document failed.
    #[error("Failed to serialize token file: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Checks if this is a "no record" condition rather than a failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
