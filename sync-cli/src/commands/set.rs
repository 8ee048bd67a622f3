//! Edit preferences and push the change.

use anyhow::Result;
use prefsync_types::PreferencePatch;

use super::{describe_outcome, print_record, Session};

/// Run the set command.
///
/// Reconciles first so the edit lands on top of the newest record, then
/// pushes immediately instead of waiting out the debounce.
pub async fn run(session: &Session, patch: &PreferencePatch) -> Result<()> {
    if patch.is_empty() {
        anyhow::bail!(
            "Nothing to set. Pass at least one of --language, --currency, --metric-system, --timezone"
        );
    }

    let identity = session.identity().await?.map(|(identity, _)| identity);
    let signed_in = identity.is_some();
    let engine = session.engine()?;

    let outcome = engine.start(identity).await;
    tracing::debug!("Pre-edit pull: {}", describe_outcome(&outcome));

    let record = engine.edit(patch);
    println!("Updated preferences:");
    print_record(&record);
    println!();

    if !signed_in {
        println!("Not signed in; change kept on this device only.");
    } else if engine.flush().await {
        println!("Pushed to {}.", session.transport_label());
    } else {
        println!("Push failed; change kept locally and will sync next time.");
    }

    engine.shutdown();
    Ok(())
}
