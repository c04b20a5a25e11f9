//! Example protected-API consumer.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tokio::sync::RwLock;
use url::Url;

use crate::auth::{Endpoint, ExchangeError};
use crate::client::http;
use crate::client::middleware::auth::{BearerAuthMiddleware, SharedCredential};
use crate::config::AppConfig;
use crate::error::Result;
use crate::store::CredentialRecord;

/// Client calling a bearer-protected endpoint with the current credential.
pub struct ApiClient {
    client: ClientWithMiddleware,
    token_info_url: Url,
    timeout: Duration,
    credential: SharedCredential,
}

impl ApiClient {
    /// Create an API client for the server in `config`.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let credential: SharedCredential = Arc::new(RwLock::new(None));

        let client = ClientBuilder::from_client(http::with_retries(
            http::base_client()?,
            config.max_retries,
        ))
        .with(BearerAuthMiddleware::new(Arc::clone(&credential)))
        .build();

        Ok(Self {
            client,
            token_info_url: config.token_info_url()?,
            timeout: config.timeouts.verification,
            credential,
        })
    }

    /// Replace the credential sent with each request.
    pub async fn set_credentials(&self, record: CredentialRecord) {
        *self.credential.write().await = Some(record);
    }

    /// Fetch the token description for the current credential.
    ///
    /// A 401 answer is [`ExchangeError::Unauthorized`].
    pub async fn token_info(&self) -> std::result::Result<String, ExchangeError> {
        let endpoint = Endpoint::TokenInfo;
        let request = self.client.get(self.token_info_url.clone());
        let (status, body) = http::send(endpoint, request, self.timeout).await?;

        match status {
            s if s.is_success() => Ok(body),
            StatusCode::UNAUTHORIZED => Err(ExchangeError::Unauthorized),
            s => Err(ExchangeError::Status {
                endpoint,
                status: s.as_u16(),
                body,
            }),
        }
    }
}
