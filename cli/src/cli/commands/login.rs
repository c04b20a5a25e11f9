//! The default command: acquire, verify and use a token.

use std::sync::Arc;

use tracing::debug;

use crate::auth::FlowCancel;
use crate::client::ApiClient;
use crate::config::AppConfig;
use crate::error::{AuthgateError, Result};
use crate::ui::FlowObserver;

/// Handle `authgate login`.
///
/// A failing sample API call is reported but does not fail the command.
pub async fn handle_login(
    config: &AppConfig,
    observer: Arc<dyn FlowObserver>,
    no_browser: bool,
    cancel: &FlowCancel,
) -> Result<()> {
    let flow = super::orchestrator(config, Arc::clone(&observer), no_browser)?;

    let record = flow.acquire(cancel).await?;
    flow.verify(&record, cancel).await?;

    let api = ApiClient::new(config)?;
    let api = &api;
    let outcome = flow
        .call_with_refresh(record, cancel, move |credential| async move {
            api.set_credentials(credential).await;
            api.token_info().await
        })
        .await;

    match outcome {
        Ok((info, _)) => {
            debug!(info = %info.trim(), "token info");
            observer.api_call_ok();
        },
        Err(AuthgateError::Exchange(err)) => observer.api_call_failed(&err),
        Err(err) => return Err(err),
    }

    Ok(())
}
