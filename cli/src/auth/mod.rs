//! OAuth 2.0 Device Authorization Grant (RFC 8628).
//!
//! - [`server`] - Requests to the authorization server
//! - [`poller`] - The polling state machine with `slow_down` backoff
//! - [`flow`] - Load, refresh or re-authorize, and use credentials
//! - [`cancel`] - Flow cancellation with a recorded cause

pub mod cancel;
pub mod error;
pub mod flow;
pub mod poller;
pub mod server;
pub mod tokens;

pub use cancel::{CancelCause, FlowCancel};
pub use error::{Endpoint, ExchangeError, OAuthErrorCode, PollError, ValidationError};
pub use flow::FlowOrchestrator;
pub use poller::{PollInterval, PollState, Poller};
pub use server::{AuthServer, HttpAuthServer};
pub use tokens::{open_browser, DeviceAuthorization, DeviceCodeResponse, TokenResponse};
