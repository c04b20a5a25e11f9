//! Configuration management for authgate.
//!
//! Values are layered, highest priority first: command-line flags and
//! environment variables (both resolved by clap), the optional TOML settings
//! file, then built-in defaults. The result is one [`AppConfig`] value.

pub mod paths;
pub mod settings;

pub use paths::config_file;
pub use settings::{AppConfig, Settings, Timeouts};

use std::path::{Path, PathBuf};

use oauth2::ClientId;
use url::Url;

use crate::error::{AuthgateError, Result};

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub client_id: Option<String>,
    pub token_file: Option<PathBuf>,
    pub scope: Option<String>,
}

/// Load settings from `path`, or from the default config file when `None`.
///
/// A missing file yields default settings.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => load_settings_from(path),
        None => load_settings_from(&config_file()?),
    }
}

/// Load settings from a specific path.
///
/// If the file doesn't exist, returns default settings.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let contents = std::fs::read_to_string(path)?;
    let settings: Settings =
        toml::from_str(&contents).map_err(|e| AuthgateError::ConfigRead(e.to_string()))?;

    Ok(settings)
}

/// Combine overrides, file settings and defaults into a validated config.
pub fn resolve(overrides: ConfigOverrides, settings: Settings) -> Result<AppConfig> {
    let raw_url = pick(overrides.server_url, settings.server_url)
        .unwrap_or_else(|| settings::defaults::SERVER_URL.to_string());
    let server_url = validate_server_url(&raw_url)?;

    let client_id = pick(overrides.client_id, settings.client_id)
        .ok_or(AuthgateError::MissingClientId)?;

    let token_file = overrides
        .token_file
        .filter(|p| !p.as_os_str().is_empty())
        .or(settings.token_file)
        .map_or_else(|| PathBuf::from(paths::DEFAULT_TOKEN_FILE), paths::expand_home);

    let scope = pick(overrides.scope, settings.scope)
        .unwrap_or_else(|| settings::defaults::SCOPE.to_string());

    let config = AppConfig {
        server_url,
        client_id: ClientId::new(client_id),
        token_file,
        scope,
        timeouts: Timeouts::from(&settings.timeouts),
        max_retries: settings.http.max_retries,
    };
    warn_on_risky_config(&config);

    Ok(config)
}

/// First non-empty value, flag/env before file.
fn pick(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fallback.filter(|v| !v.trim().is_empty()))
}

/// Validates that the server URL is properly formatted.
pub fn validate_server_url(raw: &str) -> Result<Url> {
    let invalid = |reason: String| AuthgateError::InvalidServerUrl {
        url: raw.to_string(),
        reason,
    };

    if raw.is_empty() {
        return Err(invalid("server URL cannot be empty".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| invalid(format!("invalid URL format: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!(
            "URL scheme must be http or https, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("URL must include a host".to_string()));
    }

    Ok(url)
}

fn warn_on_risky_config(config: &AppConfig) {
    if config.is_insecure() {
        tracing::warn!(
            server_url = %config.server_url,
            "using HTTP instead of HTTPS, tokens will be transmitted in plaintext; only safe for local development"
        );
    }

    if uuid::Uuid::parse_str(config.client_id.as_str()).is_err() {
        tracing::warn!(
            client_id = %config.client_id.as_str(),
            "client id doesn't appear to be a valid UUID, the server may reject it"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CLIENT: &str = "6f1c2a9e-3b7d-4c5e-9f0a-1b2c3d4e5f60";

    fn overrides_with_client() -> ConfigOverrides {
        ConfigOverrides {
            client_id: Some(CLIENT.to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = resolve(overrides_with_client(), Settings::default()).unwrap();

        assert_eq!(config.server_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.token_file, PathBuf::from(".authgate-tokens.json"));
        assert_eq!(config.scope, "read write");
        assert_eq!(config.client_id.as_str(), CLIENT);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn overrides_beat_file_settings() {
        let settings = Settings {
            server_url: Some("https://file.example.com".to_string()),
            client_id: Some("file-client".to_string()),
            token_file: Some(PathBuf::from("file-tokens.json")),
            ..Settings::default()
        };
        let overrides = ConfigOverrides {
            server_url: Some("https://flag.example.com".to_string()),
            token_file: Some(PathBuf::from("flag-tokens.json")),
            ..overrides_with_client()
        };

        let config = resolve(overrides, settings).unwrap();
        assert_eq!(config.server_url.host_str(), Some("flag.example.com"));
        assert_eq!(config.client_id.as_str(), CLIENT);
        assert_eq!(config.token_file, PathBuf::from("flag-tokens.json"));
    }

    #[test]
    fn file_settings_fill_missing_overrides() {
        let settings = Settings {
            client_id: Some("file-client".to_string()),
            scope: Some("openid".to_string()),
            ..Settings::default()
        };

        let config = resolve(ConfigOverrides::default(), settings).unwrap();
        assert_eq!(config.client_id.as_str(), "file-client");
        assert_eq!(config.scope, "openid");
    }

    #[test]
    fn missing_client_id_is_an_error() {
        let err = resolve(ConfigOverrides::default(), Settings::default()).unwrap_err();
        assert!(matches!(err, AuthgateError::MissingClientId));

        let blank = ConfigOverrides {
            client_id: Some("  ".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(matches!(
            resolve(blank, Settings::default()),
            Err(AuthgateError::MissingClientId)
        ));
    }

    #[test]
    fn server_url_validation() {
        tokio_test::assert_ok!(validate_server_url("https://auth.example.com"));
        tokio_test::assert_ok!(validate_server_url("http://localhost:8080"));

        for bad in ["", "not a url", "ftp://auth.example.com", "file:///etc/passwd"] {
            assert!(
                matches!(
                    validate_server_url(bad),
                    Err(AuthgateError::InvalidServerUrl { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load_settings_from(&dir.path().join("config.toml")).unwrap();
        assert!(settings.client_id.is_none());
    }

    #[test]
    fn load_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "server_url = \"https://auth.example.com\"\nclient_id = \"abc\"\n[http]\nmax_retries = 1\n",
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.server_url.as_deref(), Some("https://auth.example.com"));
        assert_eq!(settings.http.max_retries, 1);
    }

    #[test]
    fn invalid_settings_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "client_id = [").unwrap();

        assert!(matches!(
            load_settings_from(&path),
            Err(AuthgateError::ConfigRead(_))
        ));
    }
}
