//! One-shot reconcile with the remote copy.

use anyhow::Result;
use prefsync_client::PullOutcome;

use super::{describe_outcome, print_record, Session};

/// Run the sync command.
pub async fn run(session: &Session) -> Result<()> {
    let Some((identity, _)) = session.identity().await? else {
        println!("Not signed in. Run 'prefsync login --uid <uid> --token <token>' first.");
        return Ok(());
    };

    println!("Syncing {} via {}...", identity.uid(), session.transport_label());
    let engine = session.engine()?;
    let outcome = engine.start(Some(identity)).await;
    println!("  {}", describe_outcome(&outcome));

    if matches!(outcome, PullOutcome::LocalKept { push_scheduled: true }) {
        if engine.flush().await {
            println!("  pushed local record");
        } else {
            println!("  push failed, will retry on next sync");
        }
    }

    println!();
    println!("Preferences:");
    print_record(&engine.current());

    engine.shutdown();
    Ok(())
}
