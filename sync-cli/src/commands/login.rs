//! Sign in and out.

use anyhow::{Context, Result};
use prefsync_types::Identity;
use std::path::Path;

use crate::config::{IdentityConfig, IDENTITY_FILE};

/// Run the login command.
pub async fn login(data_dir: &Path, uid: &str, token: &str) -> Result<()> {
    let identity = Identity::new(uid, token).context("Invalid credentials")?;
    let replacing = IdentityConfig::exists(data_dir);

    IdentityConfig::new(&identity).save(data_dir).await?;

    if replacing {
        println!("Replaced stored identity.");
    }
    println!("Signed in as {}", identity.uid());
    println!("  Saved to: {}", data_dir.join(IDENTITY_FILE).display());
    println!();
    println!("Next: prefsync sync");
    Ok(())
}

/// Run the logout command.
pub async fn logout(data_dir: &Path) -> Result<()> {
    if IdentityConfig::remove(data_dir).await? {
        println!("Signed out. Preferences stay on this device.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}
