//! `snipe scan --filters <file>` — run a single scan cycle.

use crate::cli::output;
use anyhow::Result;
use std::path::Path;

/// Run one cycle and print the summary.
pub async fn run(filters: &Path, alerts: Option<&Path>) -> Result<()> {
    let engine = super::engine_from_env()?;
    let (filters, alerts) = super::open_stores(filters, alerts)?;
    let orchestrator = engine.orchestrator(filters, alerts);

    let summary = orchestrator.run_scan_cycle().await;
    output::print_summary("Scan complete", &summary);
    Ok(())
}
