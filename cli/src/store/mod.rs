//! Credential persistence for authgate.
//!
//! This module provides the multi-client token file:
//! - Load the record for one client identity
//! - Save a record, merging it with every other client's record
//! - Serialize writers across processes with an advisory lock file

pub mod error;
pub mod lock;
pub mod storage;
pub mod types;

pub use error::StoreError;
pub use lock::{Lock, LockManager, LockPolicy, MarkerFileLocks};
pub use storage::{CredentialStore, FileCredentialStore};
pub use types::{CredentialRecord, CredentialStoreDocument};
