//! Print a usable access token for scripts.

use std::sync::Arc;

use crate::auth::FlowCancel;
use crate::config::AppConfig;
use crate::error::Result;
use crate::ui::FlowObserver;

/// Handle `authgate token`.
///
/// Only the token goes to stdout, so `$(authgate token)` works.
pub async fn handle_token(
    config: &AppConfig,
    observer: Arc<dyn FlowObserver>,
    no_browser: bool,
    cancel: &FlowCancel,
) -> Result<()> {
    let flow = super::orchestrator(config, observer, no_browser)?;
    let record = flow.acquire(cancel).await?;
    println!("{}", record.access_token);
    Ok(())
}
