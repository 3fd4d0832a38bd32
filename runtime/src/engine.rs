//! Wiring for the shared acquisition components.
//!
//! One [`Engine`] owns the executor (and with it the session and
//! fingerprint state) plus the query builder and parser. The orchestrator
//! and the purchase controller built from it share that state.

use crate::acquisition::http_client::RequestExecutor;
use crate::acquisition::parser::ResultParser;
use crate::acquisition::query::{CatalogTaxonomy, QueryBuilder};
use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::orchestrator::AcquisitionOrchestrator;
use crate::purchase::PurchaseAttemptController;
use crate::store::{AlertStore, FeatureFlags, FilterSource, PurchaseExecutor};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

pub struct Engine {
    pub config: EngineConfig,
    pub events: Arc<EventBus>,
    pub executor: Arc<RequestExecutor>,
    pub queries: QueryBuilder,
    pub parser: ResultParser,
}

impl Engine {
    pub fn new(config: EngineConfig, taxonomy: CatalogTaxonomy) -> Self {
        let events = Arc::new(EventBus::default());
        let executor = Arc::new(RequestExecutor::new(&config, events.clone()));
        let queries = QueryBuilder::new(
            &config.api_base,
            &config.currency,
            config.page_size,
            Arc::new(taxonomy),
        );
        let parser = ResultParser::new(&config.base_url, &config.currency);
        Self {
            config,
            events,
            executor,
            queries,
            parser,
        }
    }

    /// Engine with the seeded taxonomy, extended by `overlay` when given.
    pub fn with_taxonomy_file(config: EngineConfig, overlay: Option<&Path>) -> Result<Self> {
        let mut taxonomy = CatalogTaxonomy::seeded();
        if let Some(path) = overlay {
            taxonomy = taxonomy.merge(CatalogTaxonomy::from_json_file(path)?);
            tracing::info!(path = %path.display(), "loaded taxonomy overlay");
        }
        Ok(Self::new(config, taxonomy))
    }

    pub fn purchase_controller(
        &self,
        flags: Arc<dyn FeatureFlags>,
        checkout: Arc<dyn PurchaseExecutor>,
    ) -> PurchaseAttemptController {
        PurchaseAttemptController::new(
            self.executor.clone(),
            self.queries.clone(),
            self.parser.clone(),
            flags,
            checkout,
            self.events.clone(),
        )
    }

    pub fn orchestrator(
        &self,
        filters: Arc<dyn FilterSource>,
        alerts: Arc<dyn AlertStore>,
    ) -> AcquisitionOrchestrator {
        AcquisitionOrchestrator::new(
            self.executor.clone(),
            self.queries.clone(),
            self.parser.clone(),
            filters,
            alerts,
            self.events.clone(),
        )
        .with_workers(self.config.workers)
    }
}
