//! Requests to the authorization server's device-code, token and
//! introspection endpoints.
//!
//! Every call is a single bounded request. Retries of transient transport
//! failures happen in the HTTP middleware; protocol errors are returned to
//! the caller unchanged.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use oauth2::devicecode::DeviceCodeErrorResponse;
use oauth2::DeviceCode;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::error::{Endpoint, ExchangeError};
use crate::auth::tokens::{DeviceAuthorization, DeviceCodeResponse, TokenResponse};
use crate::client::http;
use crate::config::{AppConfig, Timeouts};
use crate::store::CredentialRecord;

/// Grant type sent when polling with a device code.
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Grant type sent when refreshing.
pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// Operations against the authorization server (enables mocking).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthServer: Send + Sync {
    /// Starts a device authorization.
    async fn request_device_code(&self) -> Result<DeviceAuthorization, ExchangeError>;

    /// Exchanges a device code for a validated credential.
    ///
    /// `authorization_pending` and `slow_down` come back as
    /// [`ExchangeError::Protocol`] for the poller to absorb.
    async fn exchange_device_code(
        &self,
        device_code: &DeviceCode,
    ) -> Result<CredentialRecord, ExchangeError>;

    /// Obtains a new credential with `refresh_token`.
    ///
    /// The returned record keeps `refresh_token` unless the server rotated it.
    async fn refresh(&self, refresh_token: &str) -> Result<CredentialRecord, ExchangeError>;

    /// Checks an access token, returning the server's description of it.
    ///
    /// A 401 answer is [`ExchangeError::Unauthorized`].
    async fn introspect(&self, access_token: &str) -> Result<String, ExchangeError>;
}

/// [`AuthServer`] speaking form-encoded HTTP.
pub struct HttpAuthServer {
    client: ClientWithMiddleware,
    client_id: String,
    scope: String,
    device_code_url: Url,
    token_url: Url,
    token_info_url: Url,
    timeouts: Timeouts,
}

impl HttpAuthServer {
    /// Create a server client for the endpoints in `config`.
    pub fn new(config: &AppConfig, client: ClientWithMiddleware) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            client_id: config.client_id.as_str().to_string(),
            scope: config.scope.clone(),
            device_code_url: config.device_code_url()?,
            token_url: config.token_url()?,
            token_info_url: config.token_info_url()?,
            timeouts: config.timeouts,
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        url: &Url,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<T, ExchangeError> {
        let request = self.client.post(url.clone()).form(params);
        let (status, body) = http::send(endpoint, request, timeout).await?;
        decode(endpoint, status, &body)
    }
}

/// Decodes a success body as `T`, or the failure body as an OAuth error.
fn decode<T: DeserializeOwned>(
    endpoint: Endpoint,
    status: StatusCode,
    body: &str,
) -> Result<T, ExchangeError> {
    if status.is_success() {
        return serde_json::from_str(body)
            .map_err(|source| ExchangeError::Malformed { endpoint, source });
    }
    Err(error_from_body(endpoint, status, body))
}

fn error_from_body(endpoint: Endpoint, status: StatusCode, body: &str) -> ExchangeError {
    match serde_json::from_str::<DeviceCodeErrorResponse>(body) {
        Ok(response) => ExchangeError::Protocol {
            code: response.error().into(),
            description: response.error_description().cloned(),
        },
        Err(_) => ExchangeError::Status {
            endpoint,
            status: status.as_u16(),
            body: body.to_string(),
        },
    }
}

#[async_trait]
impl AuthServer for HttpAuthServer {
    async fn request_device_code(&self) -> Result<DeviceAuthorization, ExchangeError> {
        let response: DeviceCodeResponse = self
            .post_form(
                Endpoint::DeviceCode,
                &self.device_code_url,
                &[("client_id", self.client_id.as_str()), ("scope", self.scope.as_str())],
                self.timeouts.device_code,
            )
            .await?;

        Ok(DeviceAuthorization::from_response(response, Utc::now()))
    }

    async fn exchange_device_code(
        &self,
        device_code: &DeviceCode,
    ) -> Result<CredentialRecord, ExchangeError> {
        let response: TokenResponse = self
            .post_form(
                Endpoint::Token,
                &self.token_url,
                &[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("device_code", device_code.secret().as_str()),
                    ("client_id", self.client_id.as_str()),
                ],
                self.timeouts.token_exchange,
            )
            .await?;

        Ok(response.into_record(&self.client_id, None, Utc::now())?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<CredentialRecord, ExchangeError> {
        let response: TokenResponse = self
            .post_form(
                Endpoint::Token,
                &self.token_url,
                &[
                    ("grant_type", REFRESH_TOKEN_GRANT),
                    ("refresh_token", refresh_token),
                    ("client_id", self.client_id.as_str()),
                ],
                self.timeouts.refresh,
            )
            .await?;

        Ok(response.into_record(&self.client_id, Some(refresh_token), Utc::now())?)
    }

    async fn introspect(&self, access_token: &str) -> Result<String, ExchangeError> {
        let request = self
            .client
            .get(self.token_info_url.clone())
            .bearer_auth(access_token);
        let (status, body) =
            http::send(Endpoint::TokenInfo, request, self.timeouts.verification).await?;

        match status {
            s if s.is_success() => Ok(body),
            StatusCode::UNAUTHORIZED => Err(ExchangeError::Unauthorized),
            s => Err(error_from_body(Endpoint::TokenInfo, s, &body)),
        }
    }
}
