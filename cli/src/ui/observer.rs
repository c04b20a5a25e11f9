//! Progress notifications emitted while acquiring credentials.

use std::error::Error;
use std::time::Duration;

use crate::auth::{DeviceAuthorization, ExchangeError, PollInterval};
use crate::store::{CredentialRecord, StoreError};

/// Longest access-token prefix shown to the user.
pub const TOKEN_PREVIEW_CHARS: usize = 50;

/// What `done` reports about the credential in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSummary {
    /// Leading characters of the access token.
    pub preview: String,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// Remaining lifetime, rounded down to whole seconds.
    pub expires_in: Duration,
}

impl TokenSummary {
    /// Summarizes `record` for display.
    #[must_use]
    pub fn from_record(record: &CredentialRecord) -> Self {
        let remaining = record.remaining_lifetime().num_seconds().max(0);
        Self {
            preview: preview(&record.access_token),
            token_type: record.token_type.clone(),
            expires_in: Duration::from_secs(remaining.unsigned_abs()),
        }
    }
}

/// Truncates `token` to [`TOKEN_PREVIEW_CHARS`] characters.
#[must_use]
pub fn preview(token: &str) -> String {
    token.chars().take(TOKEN_PREVIEW_CHARS).collect()
}

/// Receives one call per lifecycle event.
///
/// Notifications are one-way: implementations must return promptly and
/// cannot influence the flow. Every method defaults to doing nothing.
pub trait FlowObserver: Send + Sync {
    fn tokens_found(&self) {}
    fn tokens_not_found(&self) {}
    fn token_valid(&self) {}
    fn token_expired(&self) {}
    fn refreshing(&self) {}
    fn refresh_ok(&self) {}
    fn refresh_failed(&self, _error: &ExchangeError) {}

    /// A device code was issued and the user must act.
    fn device_code_ready(&self, _authorization: &DeviceAuthorization) {}
    fn browser_opened(&self, _opened: bool) {}

    /// Polling started. `interval` tracks the live polling interval.
    fn waiting_for_auth(&self, _interval: &PollInterval) {}

    /// The server asked to slow down; `interval` is the new spacing.
    fn slow_down(&self, _interval: Duration) {}
    fn auth_success(&self) {}

    fn token_saved(&self, _location: &str) {}
    fn token_save_failed(&self, _error: &StoreError) {}

    fn verifying(&self) {}
    fn verify_ok(&self, _info: &str) {}
    fn verify_failed(&self, _error: &ExchangeError) {}

    fn access_token_rejected(&self) {}
    fn token_refreshed_retrying(&self) {}
    fn reauth_required(&self) {}
    fn api_call_ok(&self) {}
    fn api_call_failed(&self, _error: &ExchangeError) {}

    /// A usable credential was obtained.
    fn done(&self, _summary: &TokenSummary) {}

    /// The flow failed. Called at most once, and last.
    fn fatal(&self, _error: &dyn Error) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl FlowObserver for NoopObserver {}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn preview_truncates_to_fifty_chars() {
        let long = "x".repeat(80);
        assert_eq!(preview(&long).len(), 50);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let token = "é".repeat(60);
        let shown = preview(&token);
        assert_eq!(shown.chars().count(), 50);
    }

    #[test]
    fn summary_reports_remaining_lifetime() {
        let record = CredentialRecord {
            access_token: "AAAAAAAAAA".to_string(),
            refresh_token: "R1".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(3600),
            client_id: "client".to_string(),
        };
        let summary = TokenSummary::from_record(&record);

        assert_eq!(summary.preview, "AAAAAAAAAA");
        assert_eq!(summary.token_type, "Bearer");
        assert!(summary.expires_in > Duration::from_secs(3590));
        assert!(summary.expires_in <= Duration::from_secs(3600));
    }

    #[test]
    fn summary_of_expired_record_is_zero() {
        let record = CredentialRecord {
            access_token: "AAAAAAAAAA".to_string(),
            refresh_token: String::new(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() - chrono::Duration::seconds(10),
            client_id: "client".to_string(),
        };
        assert_eq!(TokenSummary::from_record(&record).expires_in, Duration::ZERO);
    }
}
