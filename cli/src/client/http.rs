//! Shared HTTP client construction.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;

use tracing::debug;

use crate::auth::{Endpoint, ExchangeError};
use crate::error::Result;

/// Shortest and longest pause between transient-failure retries.
const RETRY_MIN_DELAY: Duration = Duration::from_millis(200);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

/// Build the base `reqwest` client used for every request.
pub fn base_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(format!("authgate/{}", env!("CARGO_PKG_VERSION")))
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .build()?;
    Ok(client)
}

/// Wrap `client` with retries for connect errors, 5xx and 429 responses.
///
/// Per-call deadlines are applied by the callers, around the whole retrying call.
#[must_use]
pub fn with_retries(client: Client, max_retries: u32) -> ClientWithMiddleware {
    let policy = ExponentialBackoff::builder()
        .retry_bounds(RETRY_MIN_DELAY, RETRY_MAX_DELAY)
        .build_with_max_retries(max_retries);

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(policy))
        .build()
}

/// Build the retrying client used for authorization-server calls.
pub fn build_client(max_retries: u32) -> Result<ClientWithMiddleware> {
    Ok(with_retries(base_client()?, max_retries))
}

/// Sends `request` and reads the body, all within `timeout`.
///
/// The deadline covers every retry the middleware makes.
pub async fn send(
    endpoint: Endpoint,
    request: RequestBuilder,
    timeout: Duration,
) -> std::result::Result<(StatusCode, String), ExchangeError> {
    let call = async {
        let response = request
            .send()
            .await
            .map_err(|source| ExchangeError::Transport { endpoint, source })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Transport {
                endpoint,
                source: e.into(),
            })?;
        Ok::<_, ExchangeError>((status, body))
    };

    let (status, body) = tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ExchangeError::Timeout { endpoint, timeout })??;
    debug!(%endpoint, status = status.as_u16(), "server responded");
    Ok((status, body))
}
