//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::settings::env;
use crate::config::ConfigOverrides;

/// OAuth 2.0 device authorization for headless and SSH sessions.
///
/// Obtains an access token through the Device Authorization Grant, keeps it
/// fresh with the refresh token, and shares one token file between many
/// client identities and processes.
#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute. Defaults to `login`.
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Options shared by every command.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Authorization server base URL.
    #[arg(long, global = true, env = env::SERVER_URL)]
    pub server_url: Option<String>,

    /// OAuth client ID.
    #[arg(long, global = true, env = env::CLIENT_ID)]
    pub client_id: Option<String>,

    /// Token file shared by all clients.
    #[arg(long, global = true, env = env::TOKEN_FILE)]
    pub token_file: Option<PathBuf>,

    /// Scope to request with a new device code.
    #[arg(long, global = true, env = env::SCOPE)]
    pub scope: Option<String>,

    /// Settings file (defaults to the user config directory).
    #[arg(long, global = true, env = env::CONFIG)]
    pub config: Option<PathBuf>,

    /// Never try to open a browser.
    #[arg(long, global = true)]
    pub no_browser: bool,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Values that take precedence over the settings file.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            server_url: self.server_url.clone(),
            client_id: self.client_id.clone(),
            token_file: self.token_file.clone(),
            scope: self.scope.clone(),
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Obtain a usable access token and exercise it against the server.
    ///
    /// Uses the stored token when still valid, refreshes it when expired,
    /// and falls back to a new device authorization when the refresh token
    /// has been revoked.
    Login,

    /// Print a usable access token on stdout.
    ///
    /// Runs the same acquisition as `login`; progress goes to stderr.
    Token,

    /// Show the stored credential for this client without contacting the server.
    Status,

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: ShellType,
    },
}

/// Supported shells for completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
