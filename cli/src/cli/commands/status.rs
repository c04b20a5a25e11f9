//! Offline view of the stored credential.

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;

use crate::config::AppConfig;
use crate::error::Result;
use crate::store::{CredentialRecord, CredentialStore, FileCredentialStore};
use crate::ui::plain::format_duration;

/// Handle `authgate status`.
///
/// Reads the token file only; the server is never contacted.
pub async fn handle_status(config: &AppConfig) -> Result<()> {
    let store = Arc::new(FileCredentialStore::new(&config.token_file));
    let client_id = config.client_id.as_str().to_string();

    let loaded = {
        let store = Arc::clone(&store);
        tokio::task::spawn_blocking(move || store.load(&client_id)).await?
    };

    let record = match loaded {
        Ok(record) => Some(record),
        Err(err) if err.is_not_found() => None,
        Err(err) => return Err(err.into()),
    };

    let mut out = std::io::stdout().lock();
    write_status(&mut out, config, &store.location(), record.as_ref())?;
    Ok(())
}

fn write_status(
    out: &mut impl Write,
    config: &AppConfig,
    location: &str,
    record: Option<&CredentialRecord>,
) -> std::io::Result<()> {
    writeln!(out, "Client:     {}", config.client_id.as_str())?;
    writeln!(out, "Server:     {}", config.server_url)?;
    writeln!(out, "Token file: {location}")?;

    let Some(record) = record else {
        writeln!(out, "Status:     Not logged in")?;
        writeln!(out)?;
        writeln!(out, "Run 'authgate login' to authenticate.")?;
        return Ok(());
    };

    let token_type = if record.token_type.is_empty() {
        "Bearer"
    } else {
        record.token_type.as_str()
    };
    writeln!(out, "Type:       {token_type}")?;

    if record.is_valid_at(Utc::now()) {
        let left = record.remaining_lifetime().to_std().unwrap_or_default();
        writeln!(out, "Status:     Valid")?;
        writeln!(out, "Expires in: {}", format_duration(left))?;
    } else {
        writeln!(out, "Status:     Expired")?;
    }
    writeln!(out, "Expires at: {}", record.expires_at.to_rfc3339())?;
    writeln!(
        out,
        "Refresh:    {}",
        if record.can_refresh() {
            "available"
        } else {
            "none"
        }
    )?;
    Ok(())
}
