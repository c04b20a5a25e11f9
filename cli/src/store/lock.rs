//! Cross-process advisory locking for the token file.
//!
//! A writer owns the token file while a marker file exists next to it at
//! `<path>.lock`. The marker is created with create-if-absent semantics, so
//! exactly one process can hold it at a time. Markers older than the staleness
//! threshold are presumed abandoned by a crashed holder and are reclaimed.
//!
//! - [`LockManager`] - Trait for acquiring a lock on a path (swappable for a native lock)
//! - [`MarkerFileLocks`] - Marker-file implementation
//! - [`MarkerLock`] - A held marker; released explicitly or on drop

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use crate::store::error::StoreError;

/// Age after which a lock marker is considered abandoned.
pub const STALE_AFTER: Duration = Duration::from_secs(30);

/// Delay between acquisition attempts while the lock is held.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Maximum number of waiting attempts before giving up.
pub const MAX_ATTEMPTS: u32 = 50;

/// A held lock.
pub trait Lock {
    /// Releases the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock could not be released cleanly, e.g. the
    /// marker was already removed by someone else. Callers treat this as advisory.
    fn release(self) -> Result<(), StoreError>;
}

/// Mutual exclusion for writers of a file path.
pub trait LockManager: Send + Sync {
    /// The handle returned on successful acquisition.
    type Lock: Lock;

    /// Acquires an exclusive lock for `path`, waiting if another holder has it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockTimeout`] when the retry budget is exhausted,
    /// or the underlying I/O error for anything other than contention.
    fn acquire(&self, path: &Path) -> Result<Self::Lock, StoreError>;
}

/// Timing policy for marker-file locking.
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    /// Marker age after which it is reclaimed.
    pub stale_after: Duration,
    /// Sleep between attempts.
    pub retry_delay: Duration,
    /// Attempts before timing out.
    pub max_attempts: u32,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            stale_after: STALE_AFTER,
            retry_delay: RETRY_DELAY,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

/// Lock manager backed by exclusive marker files.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerFileLocks {
    policy: LockPolicy,
}

impl MarkerFileLocks {
    /// Creates a lock manager with a custom timing policy.
    #[must_use]
    pub const fn with_policy(policy: LockPolicy) -> Self {
        Self { policy }
    }

    /// Path of the marker guarding `path`.
    #[must_use]
    pub fn marker_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn try_create(marker: &Path) -> std::io::Result<File> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options.open(marker)
    }

    /// Returns `true` if the marker exists and is older than the threshold.
    ///
    /// A marker that vanished between the failed create and this check is
    /// reported as not stale; the next attempt will simply retry creation.
    fn is_stale(&self, marker: &Path) -> bool {
        fs::metadata(marker)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.policy.stale_after)
    }
}

impl LockManager for MarkerFileLocks {
    type Lock = MarkerLock;

    fn acquire(&self, path: &Path) -> Result<MarkerLock, StoreError> {
        let marker = Self::marker_path(path);
        let mut attempts = 0;

        while attempts < self.policy.max_attempts {
            match Self::try_create(&marker) {
                Ok(mut file) => {
                    // Owner PID is diagnostic only.
                    if let Err(e) = write!(file, "{}", std::process::id()) {
                        tracing::debug!(path = %marker.display(), error = %e, "could not record lock owner");
                    }
                    tracing::debug!(path = %marker.display(), attempts, "acquired token file lock");
                    return Ok(MarkerLock {
                        file: Some(file),
                        path: marker,
                        released: false,
                    });
                },
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.is_stale(&marker) {
                        tracing::warn!(path = %marker.display(), "removing stale lock file");
                        match fs::remove_file(&marker) {
                            Ok(()) => {},
                            // Another waiter reclaimed it first.
                            Err(e) if e.kind() == ErrorKind::NotFound => {},
                            Err(source) => {
                                return Err(StoreError::StaleLock {
                                    path: marker,
                                    source,
                                })
                            },
                        }
                        continue;
                    }

                    attempts += 1;
                    tracing::debug!(path = %marker.display(), attempts, "token file lock busy, waiting");
                    thread::sleep(self.policy.retry_delay);
                },
                Err(source) => {
                    return Err(StoreError::Lock {
                        path: marker,
                        source,
                    })
                },
            }
        }

        Err(StoreError::LockTimeout {
            path: marker,
            waited: self.policy.retry_delay * self.policy.max_attempts,
        })
    }
}

/// A held marker-file lock.
///
/// Dropping an unreleased lock removes the marker on a best-effort basis so an
/// early return never leaves the lock held until it goes stale.
#[derive(Debug)]
pub struct MarkerLock {
    file: Option<File>,
    path: PathBuf,
    released: bool,
}

impl MarkerLock {
    /// Path of the marker file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Lock for MarkerLock {
    fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        drop(self.file.take());
        fs::remove_file(&self.path).map_err(|source| StoreError::Lock {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for MarkerLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file on drop");
        }
    }
}
