//! Middleware injecting the current access token as a Bearer header.

use std::sync::Arc;

use async_trait::async_trait;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use tokio::sync::RwLock;

use crate::store::CredentialRecord;

/// Shared, swappable credential used by [`BearerAuthMiddleware`].
pub type SharedCredential = Arc<RwLock<Option<CredentialRecord>>>;

/// Middleware that adds `Authorization: Bearer <access_token>`.
///
/// Requests pass through untouched while no credential is set.
pub struct BearerAuthMiddleware {
    credential: SharedCredential,
}

impl BearerAuthMiddleware {
    #[must_use]
    pub const fn new(credential: SharedCredential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl Middleware for BearerAuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if let Some(record) = self.credential.read().await.as_ref() {
            if let Ok(value) = format!("Bearer {}", record.access_token).parse() {
                req.headers_mut().insert(http::header::AUTHORIZATION, value);
            }
        }

        next.run(req, extensions).await
    }
}
