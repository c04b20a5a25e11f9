//! Command handlers for authgate.

mod completions;
mod login;
mod status;
mod token;

use std::io::IsTerminal;
use std::sync::Arc;

pub use completions::handle_completions;
pub use login::handle_login;
pub use status::handle_status;
pub use token::handle_token;

use crate::auth::{FlowOrchestrator, HttpAuthServer};
use crate::client::http;
use crate::config::AppConfig;
use crate::error::Result;
use crate::store::FileCredentialStore;
use crate::ui::FlowObserver;

/// Orchestrator wired to the configured server and token file.
pub(crate) type Orchestrator = FlowOrchestrator<HttpAuthServer, FileCredentialStore>;

pub(crate) fn orchestrator(
    config: &AppConfig,
    observer: Arc<dyn FlowObserver>,
    no_browser: bool,
) -> Result<Orchestrator> {
    let server = HttpAuthServer::new(config, http::build_client(config.max_retries)?)?;
    let store = Arc::new(FileCredentialStore::new(&config.token_file));

    Ok(FlowOrchestrator::new(server, store, observer, config.client_id.as_str())
        .with_browser(should_launch_browser(no_browser)))
}

/// Headless sessions never get a browser.
fn should_launch_browser(no_browser: bool) -> bool {
    !no_browser && std::io::stderr().is_terminal()
}
