//! Show sync status.

use anyhow::Result;
use std::path::Path;

use super::Session;
use crate::config::IdentitySource;

/// Run the status command. Never touches the network.
pub async fn run(session: &Session, config_path: &Path) -> Result<()> {
    println!("=== prefsync status ===");
    println!();

    println!("Paths:");
    println!("  Data dir: {}", session.data_dir.display());
    let config_note = if config_path.exists() { "" } else { " (not found, using defaults)" };
    println!("  Config:   {}{}", config_path.display(), config_note);
    println!();

    println!("Account:");
    match session.identity().await {
        Ok(Some((identity, source))) => {
            let from = match source {
                IdentitySource::Environment => "environment",
                IdentitySource::File => "identity file",
            };
            println!("  Signed in: {} (from {})", identity.uid(), from);
        }
        Ok(None) => {
            println!("  Signed in: NO");
            println!();
            println!("Run 'prefsync login --uid <uid> --token <token>' to enable sync.");
        }
        Err(e) => println!("  Signed in: ERROR ({:#})", e),
    }
    println!();

    println!("Transport:");
    println!("  Mode:      {}", session.transport_label());
    if !session.mock {
        if session.config.sync.endpoints.is_empty() {
            println!("  Endpoints: none configured");
        }
        for (i, endpoint) in session.config.sync.endpoints.iter().enumerate() {
            let label = if i == 0 { "primary" } else { "fallback" };
            println!("    [{}] {}", label, endpoint);
        }
    }
    println!(
        "  Debounce:  {}ms, poll every {}s",
        session.config.sync.debounce_ms, session.config.sync.poll_interval_secs
    );
    println!();

    let record = session.store().read();
    println!("Local record:");
    if record.is_unwritten() {
        println!("  Never written");
    } else {
        println!("  Last change: {}", format_age_ms(record.updated_at_ms));
    }

    Ok(())
}

/// Format a Unix millisecond timestamp relative to now.
fn format_age_ms(ts_ms: i64) -> String {
    let now_ms = prefsync_client::now_ms();
    let diff = now_ms.saturating_sub(ts_ms) / 1000;

    if diff < 0 {
        "in the future (clock skew)".to_string()
    } else if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
