//! # prefsync
//!
//! Command-line front end for the prefsync engine.
//!
//! ## Commands
//!
//! - `show`: Print the local preferences
//! - `set`: Edit preferences and push the change
//! - `sync`: Reconcile with the remote copy once
//! - `watch`: Keep syncing and print every change
//! - `login` / `logout`: Manage the signed-in account
//! - `status`: Show paths, account and transport
//!
//! ## Example
//!
//! ```bash
//! # Sign in
//! prefsync login --uid user-123 --token "$TOKEN"
//!
//! # Change currency and push
//! prefsync set --currency AED
//!
//! # Pull whatever another device wrote
//! prefsync sync
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prefsync_types::PreferencePatch;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{login, set, show, status, sync, watch, Session};
use config::{set_dir_permissions_0700, AppConfig, CONFIG_FILE, ENV_ENDPOINT};

/// Local-first preference sync.
#[derive(Parser, Debug)]
#[command(name = "prefsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the local store and identity
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/prefsync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-process realtime backend instead of HTTP (for testing/demo)
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the local preferences
    Show {
        /// Print the stored JSON record
        #[arg(long)]
        json: bool,
    },

    /// Edit preferences and push the change
    Set {
        /// Display language (e.g. en, ru, ar)
        #[arg(long)]
        language: Option<String>,

        /// Currency code (e.g. USD, AED)
        #[arg(long)]
        currency: Option<String>,

        /// Unit system (metric or imperial)
        #[arg(long)]
        metric_system: Option<String>,

        /// Timezone identifier (e.g. utc, Asia/Dubai)
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Reconcile with the remote copy once
    Sync,

    /// Keep syncing and print every change until Ctrl-C
    Watch,

    /// Store the account used for sync
    Login {
        /// Account id
        #[arg(long)]
        uid: String,

        /// Bearer token
        #[arg(long)]
        token: String,
    },

    /// Forget the stored account
    Logout,

    /// Show paths, account and transport
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prefsync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    set_dir_permissions_0700(&data_dir).await?;

    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE));

    match cli.command {
        Commands::Login { uid, token } => login::login(&data_dir, &uid, &token).await,
        Commands::Logout => login::logout(&data_dir).await,
        command => {
            let session = load_session(&data_dir, &config_path, cli.mock)?;
            match command {
                Commands::Show { json } => show::run(&session, json).await,
                Commands::Set {
                    language,
                    currency,
                    metric_system,
                    timezone,
                } => {
                    let patch = PreferencePatch {
                        language,
                        currency,
                        metric_system,
                        timezone,
                    };
                    set::run(&session, &patch).await
                }
                Commands::Sync => sync::run(&session).await,
                Commands::Watch => watch::run(&session).await,
                Commands::Status => status::run(&session, &config_path).await,
                Commands::Login { .. } | Commands::Logout => Ok(()),
            }
        }
    }
}

fn load_session(data_dir: &Path, config_path: &Path, mock: bool) -> Result<Session> {
    let config = AppConfig::load_or_default(config_path)?
        .with_env_endpoint(std::env::var(ENV_ENDPOINT).ok());
    tracing::debug!("Loaded config from {}", config_path.display());
    Ok(Session {
        data_dir: data_dir.to_path_buf(),
        config,
        mock,
    })
}

/// Get the default data directory for prefsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "prefsync", "prefsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
