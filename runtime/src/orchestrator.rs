// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Acquisition orchestrator — one independent pass over every active filter.
//!
//! Per filter: build query, execute, parse, then dedup each item against the
//! alert store and create an alert for anything new. A failing filter is
//! logged and skipped for the cycle; the rest continue. Filters run
//! concurrently up to the configured worker count.

use crate::acquisition::http_client::RequestExecutor;
use crate::acquisition::parser::ResultParser;
use crate::acquisition::query::QueryBuilder;
use crate::events::{now_timestamp, EngineEvent, EventBus};
use crate::model::{AlertAction, AlertRecord, CatalogItem, FilterSpec, ScanSummary};
use crate::purchase::PurchaseAttemptController;
use crate::store::{AlertStore, CredentialStore, FilterSource};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Automatic purchase wiring for filters with `snipe_enabled`.
pub struct SnipeHook {
    pub controller: Arc<PurchaseAttemptController>,
    pub credentials: Arc<dyn CredentialStore>,
}

pub struct AcquisitionOrchestrator {
    executor: Arc<RequestExecutor>,
    queries: QueryBuilder,
    parser: ResultParser,
    filters: Arc<dyn FilterSource>,
    alerts: Arc<dyn AlertStore>,
    events: Arc<EventBus>,
    snipe: Option<SnipeHook>,
    workers: usize,
}

impl AcquisitionOrchestrator {
    pub fn new(
        executor: Arc<RequestExecutor>,
        queries: QueryBuilder,
        parser: ResultParser,
        filters: Arc<dyn FilterSource>,
        alerts: Arc<dyn AlertStore>,
        events: Arc<EventBus>,
    ) -> Self {
        let workers = executor.config().workers.max(1);
        Self {
            executor,
            queries,
            parser,
            filters,
            alerts,
            events,
            snipe: None,
            workers,
        }
    }

    pub fn with_snipe(mut self, hook: SnipeHook) -> Self {
        self.snipe = Some(hook);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    /// Run one full scan cycle.
    pub async fn run_scan_cycle(&self) -> ScanSummary {
        self.run_scan_cycle_until(CancellationToken::new()).await
    }

    /// Run one scan cycle, abandoning unfinished filters once `cancel` fires.
    ///
    /// Filters that did not finish are not counted as processed.
    pub async fn run_scan_cycle_until(&self, cancel: CancellationToken) -> ScanSummary {
        let started = Instant::now();
        let mut summary = ScanSummary::default();

        let filters = match self.filters.list_active_filters().await {
            Ok(f) => f,
            Err(e) => {
                tracing::error!("failed to list active filters: {e}");
                summary.errors = 1;
                self.finish(&summary, false, started);
                return summary;
            }
        };

        let session = self.executor.sessions().info();
        tracing::info!(
            filters = filters.len(),
            workers = self.workers,
            session = %session.token,
            session_requests = session.request_count,
            "scan cycle started"
        );
        self.events.emit(EngineEvent::ScanStarted {
            filters: filters.len(),
            timestamp: now_timestamp(),
        });

        let results: Vec<Option<ScanSummary>> = stream::iter(filters.iter())
            .map(|filter| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::debug!(filter_id = filter.id, "filter abandoned by cancellation");
                            None
                        }
                        s = self.scan_filter(filter) => Some(s),
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for result in results.iter().flatten() {
            summary.absorb(result);
        }

        self.finish(&summary, cancel.is_cancelled(), started);
        summary
    }

    /// Repeat scan cycles every `interval` until `cancel` fires.
    ///
    /// Returns the totals across all cycles.
    pub async fn run_until_cancelled(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> ScanSummary {
        let mut totals = ScanSummary::default();
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut cycles: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let summary = self.run_scan_cycle_until(cancel.clone()).await;
                    totals.absorb(&summary);
                    cycles = cycles.saturating_add(1);
                }
            }
        }

        tracing::info!(cycles, alerts = totals.alerts_created, "scan loop stopping");
        totals
    }

    fn finish(&self, summary: &ScanSummary, cancelled: bool, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            filters = summary.filters_processed,
            items = summary.items_found,
            alerts = summary.alerts_created,
            errors = summary.errors,
            snipes = summary.snipes_attempted,
            cancelled,
            elapsed_ms,
            "scan cycle complete"
        );
        self.events.emit(EngineEvent::ScanComplete {
            summary: summary.clone(),
            cancelled,
            elapsed_ms,
        });
    }

    /// One filter's pass. Errors end the pass and are counted, never raised.
    async fn scan_filter(&self, filter: &FilterSpec) -> ScanSummary {
        let started = Instant::now();
        let mut summary = ScanSummary {
            filters_processed: 1,
            ..Default::default()
        };

        let query = self.queries.build(filter);
        let response = match self.executor.execute(&query).await {
            Ok(r) => r,
            Err(e) => {
                self.fail(filter, &mut summary, e.to_string());
                return summary;
            }
        };

        let items = self.parser.parse(&response.body, &response.content_type);
        summary.items_found = items.len();

        let mut seen: HashSet<&str> = HashSet::new();
        for item in &items {
            if !seen.insert(item.id.as_str()) {
                continue;
            }

            match self.alerts.alert_exists(filter.id, &item.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    self.fail(filter, &mut summary, format!("alert lookup failed: {e}"));
                    return summary;
                }
            }

            let record = AlertRecord::new_alert(filter, item);
            if let Err(e) = self.alerts.create_alert(&record).await {
                self.fail(filter, &mut summary, format!("alert creation failed: {e}"));
                return summary;
            }
            summary.alerts_created += 1;
            tracing::info!(
                filter_id = filter.id,
                item_id = %item.id,
                price = item.price,
                title = %item.title,
                "new item"
            );
            self.events.emit(EngineEvent::NewItem {
                filter_id: filter.id,
                owner_id: filter.owner_id,
                item: item.clone(),
            });

            if self.snipe_item(filter, item).await {
                summary.snipes_attempted += 1;
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            filter_id = filter.id,
            items = summary.items_found,
            alerts = summary.alerts_created,
            elapsed_ms,
            "filter scanned"
        );
        self.events.emit(EngineEvent::FilterScanned {
            filter_id: filter.id,
            items_found: summary.items_found,
            alerts_created: summary.alerts_created,
            elapsed_ms,
        });
        summary
    }

    fn fail(&self, filter: &FilterSpec, summary: &mut ScanSummary, error: String) {
        tracing::warn!(filter_id = filter.id, error = %error, "filter skipped for this cycle");
        summary.errors += 1;
        self.events.emit(EngineEvent::FilterFailed {
            filter_id: filter.id,
            error,
        });
    }

    /// Attempt a purchase for a freshly alerted item. The alert already
    /// exists, so the same (filter, item) is never attempted twice.
    async fn snipe_item(&self, filter: &FilterSpec, item: &CatalogItem) -> bool {
        let Some(hook) = &self.snipe else {
            return false;
        };
        if !filter.snipe_enabled {
            return false;
        }
        let Some(max_price) = filter.max_price else {
            tracing::debug!(filter_id = filter.id, "snipe enabled without max_price; skipping");
            return false;
        };

        let credential = match hook.credentials.credential_for(filter.owner_id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                tracing::warn!(
                    filter_id = filter.id,
                    owner_id = filter.owner_id,
                    "no checkout credential; not sniping"
                );
                return false;
            }
            Err(e) => {
                tracing::warn!(filter_id = filter.id, "credential lookup failed: {e}");
                return false;
            }
        };

        let result = hook.controller.attempt(&item.id, max_price, &credential).await;
        let action = result.outcome.alert_action();
        if action != AlertAction::Alert {
            if let Err(e) = self.alerts.set_action(filter.id, &item.id, action).await {
                tracing::warn!(
                    filter_id = filter.id,
                    item_id = %item.id,
                    "failed to record snipe outcome: {e}"
                );
            }
        }
        true
    }
}
