//! `snipe watch --filters <file>` — scan repeatedly until Ctrl-C.

use crate::cli::output;
use crate::events::EngineEvent;
use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Run scan cycles every `interval_secs` until interrupted.
pub async fn run(filters: &Path, alerts: Option<&Path>, interval_secs: u64) -> Result<()> {
    let engine = super::engine_from_env()?;
    let (filters, alerts) = super::open_stores(filters, alerts)?;
    let orchestrator = engine.orchestrator(filters, alerts);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling scan");
        }
        on_signal.cancel();
    });

    // Stream new items to stdout while the loop runs
    let mut events = engine.events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "item printer lagged behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if let EngineEvent::NewItem { filter_id, item, .. } = &event {
                if output::is_json() {
                    output::print_json(&event);
                } else if !output::is_quiet() {
                    println!(
                        "[filter {filter_id}] {} | {:.2} {} | {}",
                        item.title, item.price, item.currency, item.url
                    );
                }
            }
        }
    });

    tracing::info!(interval_secs, "watching filters");
    let totals = orchestrator
        .run_until_cancelled(Duration::from_secs(interval_secs.max(1)), cancel)
        .await;
    output::print_summary("Watch stopped", &totals);
    Ok(())
}
