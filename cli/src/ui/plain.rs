//! Line-oriented observer for terminals and logs.

use std::error::Error;
use std::io::{self, IsTerminal, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::auth::{DeviceAuthorization, ExchangeError, PollInterval};
use crate::error::error_chain;
use crate::store::StoreError;
use crate::ui::observer::{FlowObserver, TokenSummary};
use crate::ui::ticker::Ticker;

/// Writes one line per event.
///
/// With progress enabled, a [`Ticker`] runs while waiting for the user.
pub struct PlainObserver {
    out: Mutex<Box<dyn Write + Send>>,
    progress: bool,
    ticker: Mutex<Option<Ticker>>,
}

impl PlainObserver {
    /// Observer writing to `out`, without a progress line.
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            progress: false,
            ticker: Mutex::new(None),
        }
    }

    /// Observer on stderr, with progress when stderr is a terminal.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            out: Mutex::new(Box::new(io::stderr())),
            progress: io::stderr().is_terminal(),
            ticker: Mutex::new(None),
        }
    }

    fn ticker(&self) -> MutexGuard<'_, Option<Ticker>> {
        self.ticker.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn stop_ticker(&self) {
        if let Some(ticker) = self.ticker().take() {
            ticker.stop();
        }
    }

    fn line(&self, text: &str) {
        if let Some(ticker) = self.ticker().as_ref() {
            ticker.println(text);
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        // Display output is best-effort.
        let _ = writeln!(out, "{text}");
    }
}

impl FlowObserver for PlainObserver {
    fn tokens_found(&self) {
        self.line("Found stored credentials.");
    }

    fn tokens_not_found(&self) {
        self.line("No stored credentials, starting device authorization.");
    }

    fn token_valid(&self) {
        self.line("Access token is still valid.");
    }

    fn token_expired(&self) {
        self.line("Access token has expired.");
    }

    fn refreshing(&self) {
        self.line("Refreshing access token...");
    }

    fn refresh_ok(&self) {
        self.line("Access token refreshed.");
    }

    fn refresh_failed(&self, error: &ExchangeError) {
        self.line(&format!("Refresh failed: {}", error_chain(error)));
    }

    fn device_code_ready(&self, authorization: &DeviceAuthorization) {
        self.line("");
        self.line("To authenticate, visit:");
        self.line("");
        self.line(&format!("  {}", authorization.verification_uri));
        self.line("");
        self.line(&format!("And enter code: {}", authorization.user_code));
        if let Some(complete) = &authorization.verification_uri_complete {
            self.line("");
            self.line(&format!("Or open: {complete}"));
        }
        if let Some(left) = authorization.time_left(chrono::Utc::now()) {
            self.line(&format!("The code expires in {}.", format_duration(left)));
        }
        self.line("");
    }

    fn browser_opened(&self, opened: bool) {
        if opened {
            self.line("Browser opened automatically.");
        } else {
            self.line("Could not open a browser. Please visit the URL manually.");
        }
    }

    fn waiting_for_auth(&self, interval: &PollInterval) {
        if self.progress {
            self.stop_ticker();
            *self.ticker() = Some(Ticker::start(interval.clone()));
        } else {
            self.line("Waiting for authorization...");
        }
    }

    fn slow_down(&self, interval: Duration) {
        self.line(&format!(
            "Server asked to slow down, polling every {:.1}s.",
            interval.as_secs_f64()
        ));
    }

    fn auth_success(&self) {
        self.stop_ticker();
        self.line("Authorization received!");
    }

    fn token_saved(&self, location: &str) {
        self.line(&format!("Credentials saved to {location}."));
    }

    fn token_save_failed(&self, error: &StoreError) {
        self.line(&format!("Warning: could not save credentials: {}", error_chain(error)));
    }

    fn verifying(&self) {
        self.line("Verifying access token...");
    }

    fn verify_ok(&self, info: &str) {
        self.line("Access token verified.");
        if !info.trim().is_empty() {
            self.line(&format!("  {}", info.trim()));
        }
    }

    fn verify_failed(&self, error: &ExchangeError) {
        self.line(&format!("Verification failed: {}", error_chain(error)));
    }

    fn access_token_rejected(&self) {
        self.line("Access token rejected, refreshing...");
    }

    fn token_refreshed_retrying(&self) {
        self.line("Got a new access token, retrying request...");
    }

    fn reauth_required(&self) {
        self.line("Refresh token is no longer valid, re-authorization required.");
    }

    fn api_call_ok(&self) {
        self.line("API call succeeded.");
    }

    fn api_call_failed(&self, error: &ExchangeError) {
        self.line(&format!("API call failed: {}", error_chain(error)));
    }

    fn done(&self, summary: &TokenSummary) {
        self.stop_ticker();
        self.line("");
        self.line(&format!("  Token:      {}...", summary.preview));
        self.line(&format!("  Type:       {}", summary.token_type));
        self.line(&format!("  Expires in: {}", format_duration(summary.expires_in)));
        self.line("");
    }

    fn fatal(&self, error: &dyn Error) {
        self.stop_ticker();
        self.line(&format!("Error: {}", error_chain(error)));
    }
}

impl Drop for PlainObserver {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

/// Renders `d` as `1h2m3s`, omitting leading zero units.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m{seconds}s"),
        _ => format!("{hours}h{minutes}m{seconds}s"),
    }
}
