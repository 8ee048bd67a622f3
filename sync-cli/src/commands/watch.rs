//! Stay running and print every preference change.

use anyhow::Result;
use std::future::Future;

use super::{describe_outcome, Session};

/// Run the watch command until Ctrl-C.
pub async fn run(session: &Session) -> Result<()> {
    run_until(session, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Run the watch loop until `stop` completes.
pub async fn run_until<F>(session: &Session, stop: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let identity = session.identity().await?.map(|(identity, _)| identity);
    let engine = session.engine()?;

    engine.subscribe(|signal| {
        let record = &signal.record;
        println!(
            "[{}] language={} currency={} units={} timezone={} updatedAtMs={}",
            signal.origin,
            record.language,
            record.currency,
            record.metric_system,
            record.timezone,
            record.updated_at_ms
        );
    });

    let outcome = engine.start(identity).await;
    println!("Watching via {} ({})", session.transport_label(), describe_outcome(&outcome));
    if engine.is_live() {
        println!("Live subscription open. Press Ctrl-C to stop.");
    } else if engine.is_polling() {
        println!(
            "Polling every {}s. Press Ctrl-C to stop.",
            engine.config().poll_interval.as_secs()
        );
    } else {
        println!("Signed out; showing local changes only. Press Ctrl-C to stop.");
    }

    stop.await;

    if engine.flush().await {
        println!("Flushed pending push.");
    }
    engine.shutdown();
    println!("Stopped.");
    Ok(())
}
