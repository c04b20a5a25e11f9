//! Flow cancellation with a recorded cause.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a flow was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The user interrupted the process.
    Interrupted,
    /// A deadline passed before the flow finished.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Cancellation signal shared by everything working on one flow.
///
/// Child signals are cancelled with their parent and report the parent's
/// cause unless they were cancelled first on their own.
#[derive(Debug, Clone, Default)]
pub struct FlowCancel {
    token: CancellationToken,
    cause: Arc<OnceLock<CancelCause>>,
    parent: Option<Arc<OnceLock<CancelCause>>>,
}

impl FlowCancel {
    /// Creates a fresh, uncancelled signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child signal cancelled whenever `self` is.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            cause: Arc::new(OnceLock::new()),
            parent: Some(Arc::clone(&self.cause)),
        }
    }

    /// Cancels the flow. The first recorded cause wins.
    pub fn cancel(&self, cause: CancelCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// Whether the flow has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The recorded cause, once cancelled.
    #[must_use]
    pub fn cause(&self) -> Option<CancelCause> {
        if !self.is_cancelled() {
            return None;
        }
        self.cause
            .get()
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.get()))
            .copied()
            .or(Some(CancelCause::Interrupted))
    }

    /// Waits until the flow is cancelled and returns the cause.
    pub async fn cancelled(&self) -> CancelCause {
        self.token.cancelled().await;
        self.cause().unwrap_or(CancelCause::Interrupted)
    }

    /// Spawns a task that cancels this signal with
    /// [`CancelCause::DeadlineExceeded`] at `deadline`.
    ///
    /// The task ends early if the signal is cancelled first; abort the
    /// returned handle once the guarded work is done.
    pub fn cancel_at(&self, deadline: Instant) -> tokio::task::JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    tracing::debug!("flow deadline reached");
                    signal.cancel(CancelCause::DeadlineExceeded);
                },
                () = signal.token.cancelled() => {},
            }
        })
    }
}
