//! Application configuration settings.

use std::path::PathBuf;
use std::time::Duration;

use oauth2::ClientId;
use serde::{Deserialize, Serialize};
use url::Url;

/// Contents of the optional `config.toml`. Every field may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Authorization server base URL.
    pub server_url: Option<String>,
    /// OAuth client identity.
    pub client_id: Option<String>,
    /// Token file location.
    pub token_file: Option<PathBuf>,
    /// Scope requested with the device code.
    pub scope: Option<String>,
    /// Per-request timeouts.
    pub timeouts: TimeoutSettings,
    /// HTTP client settings.
    pub http: HttpSettings,
}

/// Per-request timeouts in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub device_code_secs: u64,
    pub token_exchange_secs: u64,
    pub verification_secs: u64,
    pub refresh_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            device_code_secs: 10,
            token_exchange_secs: 5,
            verification_secs: 10,
            refresh_secs: 10,
        }
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Maximum number of retries for transient failures.
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Environment variables read by authgate.
pub mod env {
    pub const SERVER_URL: &str = "SERVER_URL";
    pub const CLIENT_ID: &str = "CLIENT_ID";
    pub const TOKEN_FILE: &str = "TOKEN_FILE";
    pub const SCOPE: &str = "OAUTH_SCOPE";
    pub const CONFIG: &str = "AUTHGATE_CONFIG";
    pub const LOG_LEVEL: &str = "AUTHGATE_LOG";
}

/// Built-in defaults.
pub mod defaults {
    pub const SERVER_URL: &str = "http://localhost:8080";
    pub const SCOPE: &str = "read write";
}

/// Resolved per-request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub device_code: Duration,
    pub token_exchange: Duration,
    pub verification: Duration,
    pub refresh: Duration,
}

impl From<&TimeoutSettings> for Timeouts {
    fn from(settings: &TimeoutSettings) -> Self {
        Self {
            device_code: Duration::from_secs(settings.device_code_secs),
            token_exchange: Duration::from_secs(settings.token_exchange_secs),
            verification: Duration::from_secs(settings.verification_secs),
            refresh: Duration::from_secs(settings.refresh_secs),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutSettings::default())
    }
}

/// Fully resolved configuration, built once and passed to every component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Authorization server base URL.
    pub server_url: Url,
    /// OAuth client identity; also the token file key.
    pub client_id: ClientId,
    /// Token file location.
    pub token_file: PathBuf,
    /// Scope requested with the device code.
    pub scope: String,
    /// Per-request timeouts.
    pub timeouts: Timeouts,
    /// Transient-failure retry budget.
    pub max_retries: u32,
}

impl AppConfig {
    /// Device authorization endpoint.
    pub fn device_code_url(&self) -> Result<Url, url::ParseError> {
        self.server_url.join("/oauth/device/code")
    }

    /// Token endpoint.
    pub fn token_url(&self) -> Result<Url, url::ParseError> {
        self.server_url.join("/oauth/token")
    }

    /// Token introspection endpoint.
    pub fn token_info_url(&self) -> Result<Url, url::ParseError> {
        self.server_url.join("/oauth/tokeninfo")
    }

    /// Whether tokens would travel in plaintext.
    #[must_use]
    pub fn is_insecure(&self) -> bool {
        self.server_url.scheme() == "http"
    }
}
