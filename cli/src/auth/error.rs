//! Authorization-server and polling error types.

use std::fmt;
use std::time::Duration;

use oauth2::basic::BasicErrorResponseType;
use oauth2::devicecode::DeviceCodeErrorResponseType;
use thiserror::Error;

use crate::auth::cancel::CancelCause;
use crate::auth::poller::PollState;

/// Authorization-server endpoints, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Device authorization endpoint.
    DeviceCode,
    /// Token endpoint (device grant and refresh).
    Token,
    /// Token introspection endpoint.
    TokenInfo,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceCode => write!(f, "device code"),
            Self::Token => write!(f, "token"),
            Self::TokenInfo => write!(f, "token info"),
        }
    }
}

/// OAuth error codes the client distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthErrorCode {
    /// The user has not completed the browser step yet.
    AuthorizationPending,
    /// The client is polling too fast.
    SlowDown,
    /// The device code has expired.
    ExpiredToken,
    /// The user refused the request.
    AccessDenied,
    /// The refresh token or device code is no longer valid.
    InvalidGrant,
    /// The presented token is not valid.
    InvalidToken,
    /// Any other server-reported code, verbatim.
    Other(String),
}

impl OAuthErrorCode {
    /// The wire representation of the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::ExpiredToken => "expired_token",
            Self::AccessDenied => "access_denied",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidToken => "invalid_token",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&DeviceCodeErrorResponseType> for OAuthErrorCode {
    fn from(kind: &DeviceCodeErrorResponseType) -> Self {
        match kind {
            DeviceCodeErrorResponseType::AuthorizationPending => Self::AuthorizationPending,
            DeviceCodeErrorResponseType::SlowDown => Self::SlowDown,
            DeviceCodeErrorResponseType::ExpiredToken => Self::ExpiredToken,
            DeviceCodeErrorResponseType::AccessDenied => Self::AccessDenied,
            DeviceCodeErrorResponseType::Basic(BasicErrorResponseType::InvalidGrant) => {
                Self::InvalidGrant
            },
            DeviceCodeErrorResponseType::Basic(BasicErrorResponseType::Extension(ext))
                if ext == "invalid_token" =>
            {
                Self::InvalidToken
            },
            DeviceCodeErrorResponseType::Basic(other) => Self::Other(other.as_ref().to_string()),
        }
    }
}

/// A token response that must not become a stored credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No access token in the response.
    #[error("access_token is empty")]
    EmptyAccessToken,

    /// Access token shorter than the minimum length.
    #[error("access_token is too short (length: {0})")]
    AccessTokenTooShort(usize),

    /// `expires_in` missing, zero or negative.
    #[error("expires_in must be positive, got: {0}")]
    NonPositiveExpiry(i64),

    /// `expires_in` too large to represent as an expiry time.
    #[error("expires_in is out of range: {0}")]
    ExpiryOutOfRange(i64),

    /// A token type other than `Bearer`.
    #[error("unexpected token_type: {0} (expected Bearer)")]
    UnexpectedTokenType(String),
}

/// Errors from a single request to the authorization server.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// The server answered with a structured OAuth error.
    #[error("{code}: {}", description.as_deref().unwrap_or("no description"))]
    Protocol {
        /// The OAuth error code.
        code: OAuthErrorCode,
        /// The server's `error_description`, if any.
        description: Option<String>,
    },

    /// Connection, TLS or protocol failure below HTTP.
    #[error("{endpoint} request failed: {source}")]
    Transport {
        /// Endpoint that was called.
        endpoint: Endpoint,
        /// Underlying client error.
        #[source]
        source: reqwest_middleware::Error,
    },

    /// The request did not complete within its deadline.
    #[error("{endpoint} request timed out after {timeout:?}")]
    Timeout {
        /// Endpoint that was called.
        endpoint: Endpoint,
        /// The per-call timeout that elapsed.
        timeout: Duration,
    },

    /// Non-success status without a parseable OAuth error body.
    #[error("{endpoint} request failed with status {status}: {body}")]
    Status {
        /// Endpoint that was called.
        endpoint: Endpoint,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Success status with a body that does not decode.
    #[error("failed to parse {endpoint} response: {source}")]
    Malformed {
        /// Endpoint that was called.
        endpoint: Endpoint,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// The token response failed validation.
    #[error("invalid token response: {0}")]
    InvalidToken(#[from] ValidationError),

    /// The access token was rejected (HTTP 401).
    #[error("access token rejected by server (401)")]
    Unauthorized,
}

impl ExchangeError {
    /// The OAuth error code, if the server returned one.
    #[must_use]
    pub const fn protocol_code(&self) -> Option<&OAuthErrorCode> {
        match self {
            Self::Protocol { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Checks if the refresh token can no longer be used.
    ///
    /// Only `invalid_grant` and `invalid_token` qualify.
    #[must_use]
    pub const fn is_invalid_grant(&self) -> bool {
        matches!(
            self.protocol_code(),
            Some(OAuthErrorCode::InvalidGrant | OAuthErrorCode::InvalidToken)
        )
    }
}

/// Terminal outcomes of the device-code polling loop other than success.
#[derive(Error, Debug)]
pub enum PollError {
    /// The user explicitly refused authorization.
    #[error("user denied authorization")]
    Denied,

    /// The device code expired on the server.
    #[error("device code expired, please restart the flow")]
    Expired,

    /// Any other OAuth error code, preserved for diagnostics.
    #[error("authorization failed: {code} - {description}")]
    Rejected {
        /// The server's error code.
        code: String,
        /// The server's error description.
        description: String,
    },

    /// Transport, parse or validation failure.
    #[error("token exchange failed: {0}")]
    Exchange(#[source] ExchangeError),

    /// The flow was cancelled before it finished.
    #[error("authorization cancelled: {0}")]
    Cancelled(CancelCause),
}

impl PollError {
    /// The terminal state this error represents.
    #[must_use]
    pub const fn state(&self) -> PollState {
        match self {
            Self::Denied => PollState::Denied,
            Self::Expired => PollState::Expired,
            Self::Rejected { .. } | Self::Exchange(_) => PollState::Failed,
            Self::Cancelled(_) => PollState::Cancelled,
        }
    }
}
