// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Purchase decision gate.
//!
//! Fetches the current listing, refuses anything above the price ceiling or
//! no longer buyable, and only then hands off to the checkout collaborator.
//! Every attempt ends in exactly one typed outcome and is never retried.

use crate::acquisition::http_client::RequestExecutor;
use crate::acquisition::parser::ResultParser;
use crate::acquisition::query::QueryBuilder;
use crate::error::RequestError;
use crate::events::{EngineEvent, EventBus};
use crate::model::{PurchaseAttemptResult, PurchaseOutcome};
use crate::store::{FeatureFlags, PurchaseExecutor};
use std::sync::Arc;

/// Decides whether an automated purchase may proceed and runs it.
pub struct PurchaseAttemptController {
    executor: Arc<RequestExecutor>,
    queries: QueryBuilder,
    parser: ResultParser,
    flags: Arc<dyn FeatureFlags>,
    checkout: Arc<dyn PurchaseExecutor>,
    events: Arc<EventBus>,
}

impl PurchaseAttemptController {
    pub fn new(
        executor: Arc<RequestExecutor>,
        queries: QueryBuilder,
        parser: ResultParser,
        flags: Arc<dyn FeatureFlags>,
        checkout: Arc<dyn PurchaseExecutor>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            executor,
            queries,
            parser,
            flags,
            checkout,
            events,
        }
    }

    /// Run the gate for one item.
    pub async fn attempt(&self, item_id: &str, max_price: f64, credential: &str) -> PurchaseAttemptResult {
        let result = self.decide(item_id, max_price, credential).await;
        tracing::info!(
            item_id,
            max_price,
            outcome = result.outcome.as_str(),
            detail = %result.detail,
            "purchase attempt finished"
        );
        self.events.emit(EngineEvent::PurchaseAttempted {
            item_id: result.item_id.clone(),
            outcome: result.outcome,
            detail: result.detail.clone(),
        });
        result
    }

    async fn decide(&self, item_id: &str, max_price: f64, credential: &str) -> PurchaseAttemptResult {
        if !self.flags.sniping_enabled() {
            return PurchaseAttemptResult::new(item_id, PurchaseOutcome::Disabled, "sniping disabled");
        }

        let query = self.queries.item_details(item_id);
        let response = match self.executor.execute(&query).await {
            Ok(r) => r,
            Err(RequestError::Unexpected(404)) => {
                return PurchaseAttemptResult::new(item_id, PurchaseOutcome::NotFound, "listing not found");
            }
            Err(e) => {
                return PurchaseAttemptResult::new(
                    item_id,
                    PurchaseOutcome::TechnicalFailure,
                    format!("details fetch failed: {e}"),
                );
            }
        };

        let Some(details) = self.parser.parse_item_details(&response.body) else {
            return PurchaseAttemptResult::new(item_id, PurchaseOutcome::NotFound, "no item in details payload");
        };

        if !details.price_known {
            return PurchaseAttemptResult::new(
                item_id,
                PurchaseOutcome::TechnicalFailure,
                "listing price missing or unparseable",
            );
        }

        let price = details.item.price;
        if price.is_nan() || max_price.is_nan() || price > max_price {
            return PurchaseAttemptResult::new(
                item_id,
                PurchaseOutcome::PriceTooHigh,
                format!("price {price:.2} above ceiling {max_price:.2}"),
            );
        }

        if !details.item.can_buy() {
            return PurchaseAttemptResult::new(item_id, PurchaseOutcome::Reserved, "listing reserved or hidden");
        }

        match self.checkout.purchase(&details, max_price, credential).await {
            Ok(detail) => PurchaseAttemptResult::new(item_id, PurchaseOutcome::Success, detail),
            Err(e) => PurchaseAttemptResult::new(item_id, PurchaseOutcome::TechnicalFailure, e.to_string()),
        }
    }
}
