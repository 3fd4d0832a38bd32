//! CLI subcommand implementations for the snipe binary.

pub mod attempt_cmd;
pub mod output;
pub mod scan_cmd;
pub mod watch_cmd;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::store::{AlertJournal, AlertStore, FileFilterSource, FilterSource};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Build the engine from `SNIPE_*` environment variables.
pub fn engine_from_env() -> Result<Engine> {
    let config = EngineConfig::from_env();
    config.validate()?;
    let overlay = std::env::var("SNIPE_TAXONOMY_FILE").ok().map(PathBuf::from);
    if !config.proxy.enabled() {
        tracing::warn!("no proxy credentials configured; requests go out directly");
    }
    Engine::with_taxonomy_file(config, overlay.as_deref())
}

/// Filter file plus alert journal (default ~/.snipe/alerts.jsonl).
pub fn open_stores(
    filters: &Path,
    alerts: Option<&Path>,
) -> Result<(Arc<dyn FilterSource>, Arc<dyn AlertStore>)> {
    let journal = match alerts {
        Some(path) => AlertJournal::open(path)?,
        None => AlertJournal::default_journal()?,
    };
    tracing::debug!(journal = %journal.path().display(), alerts = journal.len(), "alert journal ready");
    Ok((Arc::new(FileFilterSource::new(filters)), Arc::new(journal)))
}
