//! authgate - OAuth 2.0 device authorization for headless sessions
//!
//! authgate obtains access tokens through the Device Authorization Grant,
//! refreshes them transparently, and keeps the grants of many client
//! identities in one shared token file.

mod auth;
mod cli;
mod client;
mod config;
mod error;
mod store;
mod ui;

use std::sync::Arc;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::auth::{CancelCause, FlowCancel};
use crate::cli::{Cli, Commands, GlobalArgs};
use crate::config::settings::env;
use crate::config::AppConfig;
use crate::error::Result;
use crate::ui::{FlowObserver, PlainObserver};

#[tokio::main]
async fn main() {
    // Load .env before clap reads env-backed flags; real env vars win
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            eprintln!("Warning: ignoring .env file: {err}");
        }
    }

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.global.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(env::LOG_LEVEL)
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cancel = FlowCancel::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            interrupt.cancel(CancelCause::Interrupted);
        }
    });

    let observer: Arc<dyn FlowObserver> = Arc::new(PlainObserver::stderr());

    // Run the command
    if let Err(e) = run(cli, Arc::clone(&observer), &cancel).await {
        observer.fatal(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, observer: Arc<dyn FlowObserver>, cancel: &FlowCancel) -> Result<()> {
    let no_browser = cli.global.no_browser;
    match cli.command.unwrap_or(Commands::Login) {
        Commands::Login => {
            let config = load_config(&cli.global)?;
            cli::commands::handle_login(&config, observer, no_browser, cancel).await
        },
        Commands::Token => {
            let config = load_config(&cli.global)?;
            cli::commands::handle_token(&config, observer, no_browser, cancel).await
        },
        Commands::Status => cli::commands::handle_status(&load_config(&cli.global)?).await,
        Commands::Completions { shell } => cli::commands::handle_completions(shell),
    }
}

/// Flags and env, then the settings file, then defaults.
fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let settings = config::load_settings(global.config.as_deref())?;
    let config = config::resolve(global.overrides(), settings)?;
    debug!(
        server = %config.server_url,
        client_id = config.client_id.as_str(),
        token_file = %config.token_file.display(),
        "resolved configuration"
    );
    Ok(config)
}
