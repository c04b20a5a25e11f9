//! Error types and result aliases for authgate.
//!
//! This module provides the top-level error that command handlers return:
//! - Layer errors ([`StoreError`], [`ExchangeError`], [`PollError`]) wrapped transparently
//! - Configuration failures with actionable messages
//! - Helper methods for error classification

use thiserror::Error;

use crate::auth::{ExchangeError, PollError};
use crate::store::StoreError;

/// Main error type for authgate operations.
#[derive(Error, Debug)]
pub enum AuthgateError {
    /// No client identity was configured.
    #[error("CLIENT_ID not set. Provide it with --client-id, the CLIENT_ID environment variable, a .env file, or client_id in the config file.")]
    MissingClientId,

    /// The configured server URL is unusable.
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidServerUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// General configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}. Check file permissions and format.")]
    ConfigRead(String),

    /// No usable credentials exist and none could be obtained.
    #[error("Not authenticated. Run 'authgate login' to authenticate.")]
    NotAuthenticated,

    /// Token store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Authorization server request error.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Device authorization did not complete.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// A background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AuthgateError {
    /// Checks if this error can be resolved by running a new device flow.
    ///
    /// Returns `true` when the refresh token is no longer usable or the
    /// server rejected the access token.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        match self {
            Self::NotAuthenticated => true,
            Self::Exchange(e) => e.is_invalid_grant() || matches!(e, ExchangeError::Unauthorized),
            _ => false,
        }
    }
}

/// Result type alias using [`AuthgateError`].
pub type Result<T> = std::result::Result<T, AuthgateError>;

impl From<toml::de::Error> for AuthgateError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigRead(format!("TOML parse error: {err}"))
    }
}

/// Renders an error with its whole `source()` chain on one line.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // thiserror messages often already embed their source.
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
