//! Device-code polling loop (RFC 8628 §3.4-3.5).
//!
//! The poller waits `interval` between token requests, absorbs
//! `authorization_pending`, and grows the interval geometrically on
//! `slow_down`. Every wait and every in-flight request races the flow's
//! cancellation signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oauth2::DeviceCode;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::auth::cancel::FlowCancel;
use crate::auth::error::{ExchangeError, OAuthErrorCode, PollError};
use crate::auth::server::AuthServer;
use crate::auth::tokens::{DeviceAuthorization, MAX_POLL_INTERVAL_SECS};
use crate::store::CredentialRecord;
use crate::ui::FlowObserver;

/// Longest interval polling can reach.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(MAX_POLL_INTERVAL_SECS);

/// Growth factor applied per `slow_down`.
pub const SLOW_DOWN_FACTOR: f64 = 1.5;

/// Lifecycle of one polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Succeeded,
    Denied,
    Expired,
    Failed,
    Cancelled,
}

impl PollState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Polling)
    }
}

/// Current polling interval, shared read-only with progress displays.
///
/// Only the poller writes it.
#[derive(Debug, Clone, Default)]
pub struct PollInterval(Arc<AtomicU64>);

impl PollInterval {
    fn new(interval: Duration) -> Self {
        let this = Self::default();
        this.set(interval);
        this
    }

    #[must_use]
    pub fn get(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, interval: Duration) {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.0.store(millis, Ordering::Relaxed);
    }
}

/// `slow_down` backoff.
///
/// Each `slow_down` grows the multiplier by [`SLOW_DOWN_FACTOR`] and scales
/// the current interval by it, capped at [`MAX_POLL_INTERVAL`].
#[derive(Debug, Clone)]
pub struct Backoff {
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    #[must_use]
    pub const fn new(initial: Duration) -> Self {
        Self {
            multiplier: 1.0,
            current: initial,
        }
    }

    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }

    /// Applies one `slow_down` and returns the new interval.
    pub fn slow_down(&mut self) -> Duration {
        self.multiplier *= SLOW_DOWN_FACTOR;
        let secs =
            (self.current.as_secs_f64() * self.multiplier).min(MAX_POLL_INTERVAL.as_secs_f64());
        self.current = Duration::from_secs_f64(secs);
        self.current
    }
}

/// Drives one device authorization to a terminal state.
pub struct Poller<'a, S: ?Sized> {
    server: &'a S,
    observer: &'a dyn FlowObserver,
    device_code: DeviceCode,
    backoff: Backoff,
    interval: PollInterval,
    state: PollState,
    attempts: u32,
}

impl<'a, S> Poller<'a, S>
where
    S: AuthServer + ?Sized,
{
    #[must_use]
    pub fn new(
        server: &'a S,
        authorization: &DeviceAuthorization,
        observer: &'a dyn FlowObserver,
    ) -> Self {
        let base = authorization.poll_interval();
        Self {
            server,
            observer,
            device_code: authorization.device_code.clone(),
            backoff: Backoff::new(base),
            interval: PollInterval::new(base),
            state: PollState::Polling,
            attempts: 0,
        }
    }

    /// Handle to the live polling interval.
    #[must_use]
    pub fn interval(&self) -> PollInterval {
        self.interval.clone()
    }

    #[must_use]
    pub const fn state(&self) -> PollState {
        self.state
    }

    /// Token requests sent so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Polls until the user approves, a terminal error arrives, or `cancel` fires.
    pub async fn run(&mut self, cancel: &FlowCancel) -> Result<CredentialRecord, PollError> {
        self.observer.waiting_for_auth(&self.interval);
        let mut ticker = poll_timer(self.backoff.current());

        loop {
            tokio::select! {
                biased;
                cause = cancel.cancelled() => return Err(self.finish(PollError::Cancelled(cause))),
                _ = ticker.tick() => {},
            }

            self.attempts += 1;
            debug!(attempt = self.attempts, interval = ?self.backoff.current(), "polling token endpoint");

            let result = tokio::select! {
                biased;
                cause = cancel.cancelled() => return Err(self.finish(PollError::Cancelled(cause))),
                result = self.server.exchange_device_code(&self.device_code) => result,
            };

            match result {
                Ok(record) => {
                    self.state = PollState::Succeeded;
                    return Ok(record);
                },
                Err(ExchangeError::Protocol {
                    code: OAuthErrorCode::AuthorizationPending,
                    ..
                }) => {},
                Err(ExchangeError::Protocol {
                    code: OAuthErrorCode::SlowDown,
                    ..
                }) => {
                    let next = self.backoff.slow_down();
                    debug!(interval = ?next, "server requested slow down");
                    self.interval.set(next);
                    self.observer.slow_down(next);
                    ticker = poll_timer(next);
                },
                Err(err) => return Err(self.finish(classify(err))),
            }
        }
    }

    fn finish(&mut self, err: PollError) -> PollError {
        self.state = err.state();
        debug!(state = ?self.state, attempts = self.attempts, "polling finished");
        err
    }
}

/// Interval timer whose first tick is one `period` away.
fn poll_timer(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Maps a terminal token-endpoint error onto a polling outcome.
fn classify(err: ExchangeError) -> PollError {
    match err {
        ExchangeError::Protocol {
            code: OAuthErrorCode::ExpiredToken,
            ..
        } => PollError::Expired,
        ExchangeError::Protocol {
            code: OAuthErrorCode::AccessDenied,
            ..
        } => PollError::Denied,
        ExchangeError::Protocol { code, description } => PollError::Rejected {
            code: code.to_string(),
            description: description.unwrap_or_default(),
        },
        other => PollError::Exchange(other),
    }
}
