//! Token and device-authorization types exchanged with the authorization server.

use chrono::{DateTime, Duration, Utc};
use oauth2::DeviceCode;
use serde::Deserialize;

use crate::auth::error::ValidationError;
use crate::store::CredentialRecord;

/// Shortest access token accepted from the server.
pub const MIN_ACCESS_TOKEN_LEN: usize = 10;

/// Token type stored when the server leaves it out.
pub const BEARER: &str = "Bearer";

/// Polling interval used when the server does not suggest one.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Longest polling interval, whether suggested by the server or reached by backoff.
pub const MAX_POLL_INTERVAL_SECS: u64 = 60;

/// Device authorization endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub interval: u64,
}

/// Token endpoint success body, for both the device grant and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Checks the response can become a stored credential.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_token_response(
            &self.access_token,
            self.token_type.as_deref().unwrap_or_default(),
            self.expires_in,
        )
    }

    /// Validates the response and converts it into a record for `client_id`.
    ///
    /// `prior_refresh_token` is carried forward when the server did not issue
    /// a new refresh token (fixed-token servers); a non-empty one replaces it.
    pub fn into_record(
        self,
        client_id: &str,
        prior_refresh_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CredentialRecord, ValidationError> {
        self.validate()?;
        let expires_at = expiry_after(now, self.expires_in)
            .ok_or(ValidationError::ExpiryOutOfRange(self.expires_in))?;

        let refresh_token = match self.refresh_token {
            Some(token) if !token.is_empty() => token,
            _ => prior_refresh_token.unwrap_or_default().to_string(),
        };
        let token_type = match self.token_type {
            Some(kind) if !kind.is_empty() => kind,
            _ => BEARER.to_string(),
        };

        Ok(CredentialRecord {
            access_token: self.access_token,
            refresh_token,
            token_type,
            expires_at,
            client_id: client_id.to_string(),
        })
    }
}

/// `now + secs`, or `None` when that is not a representable time.
fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
}

/// Rejects token responses that must not be persisted.
///
/// The token type is optional, but when present it must be `Bearer`.
pub fn validate_token_response(
    access_token: &str,
    token_type: &str,
    expires_in: i64,
) -> Result<(), ValidationError> {
    if access_token.is_empty() {
        return Err(ValidationError::EmptyAccessToken);
    }
    if access_token.len() < MIN_ACCESS_TOKEN_LEN {
        return Err(ValidationError::AccessTokenTooShort(access_token.len()));
    }
    if expires_in <= 0 {
        return Err(ValidationError::NonPositiveExpiry(expires_in));
    }
    if !token_type.is_empty() && token_type != BEARER {
        return Err(ValidationError::UnexpectedTokenType(token_type.to_string()));
    }
    Ok(())
}

/// An in-progress device authorization. Never persisted.
#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    /// Secret sent back to the token endpoint while polling.
    pub device_code: DeviceCode,
    /// Code the user types at the verification page.
    pub user_code: String,
    /// Verification page.
    pub verification_uri: String,
    /// Verification page with the user code embedded, if offered.
    pub verification_uri_complete: Option<String>,
    /// When the device code stops being accepted.
    pub expiry: DateTime<Utc>,
    /// Server-suggested minimum polling spacing, in seconds.
    pub interval: u64,
}

impl DeviceAuthorization {
    /// Builds an authorization from the endpoint response received at `now`.
    #[must_use]
    pub fn from_response(response: DeviceCodeResponse, now: DateTime<Utc>) -> Self {
        Self {
            device_code: DeviceCode::new(response.device_code),
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            verification_uri_complete: response
                .verification_uri_complete
                .filter(|uri| !uri.is_empty()),
            expiry: expiry_after(now, response.expires_in.max(0))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            interval: response.interval,
        }
    }

    /// Initial polling interval, defaulting when the server sent zero and
    /// capped at [`MAX_POLL_INTERVAL_SECS`].
    #[must_use]
    pub const fn poll_interval(&self) -> std::time::Duration {
        let secs = match self.interval {
            0 => DEFAULT_POLL_INTERVAL_SECS,
            s if s > MAX_POLL_INTERVAL_SECS => MAX_POLL_INTERVAL_SECS,
            s => s,
        };
        std::time::Duration::from_secs(secs)
    }

    /// The URL to show or open: the complete URI when offered.
    #[must_use]
    pub fn browser_uri(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }

    /// Time left before the device code expires at `now`.
    #[must_use]
    pub fn time_left(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        (self.expiry - now).to_std().ok().filter(|left| !left.is_zero())
    }
}

/// Open the verification URL in the default browser.
///
/// Returns `true` if the browser was opened successfully, `false` otherwise.
pub fn open_browser(device_auth: &DeviceAuthorization) -> bool {
    open::that(device_auth.browser_uri()).is_ok()
}
