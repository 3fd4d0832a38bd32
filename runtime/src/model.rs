// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data types shared by every engine component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user-defined search filter. Read-only snapshot for one scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub id: u64,
    pub owner_id: u64,
    pub name: String,
    pub category: Option<String>,
    pub brands: Vec<String>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub materials: Vec<String>,
    pub conditions: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub keywords: Option<String>,
    /// Attempt an automatic purchase for new matches (needs `max_price`).
    pub snipe_enabled: bool,
    pub active: bool,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            id: 0,
            owner_id: 0,
            name: String::new(),
            category: None,
            brands: Vec::new(),
            sizes: Vec::new(),
            colors: Vec::new(),
            materials: Vec::new(),
            conditions: Vec::new(),
            min_price: None,
            max_price: None,
            keywords: None,
            snipe_enabled: false,
            active: true,
        }
    }
}

/// Which parse path produced an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    #[default]
    Api,
    Markup,
}

/// A normalized catalog listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub size: String,
    pub brand: String,
    pub condition: String,
    pub url: String,
    pub photo_url: String,
    pub seller_id: u64,
    pub seller_login: String,
    pub location: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub visible: bool,
    pub reserved: bool,
    pub source: ItemSource,
}

impl CatalogItem {
    /// Whether the listing can still be bought.
    pub fn can_buy(&self) -> bool {
        self.visible && !self.reserved
    }
}

/// Full listing returned by the item-details endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub item: CatalogItem,
    /// Whether the payload carried a parseable price. `item.price` is 0 when not.
    pub price_known: bool,
    pub description: String,
    pub color: String,
    pub material: String,
    pub photos: Vec<String>,
    pub measurements: BTreeMap<String, String>,
    pub view_count: u64,
    pub favourite_count: u64,
    pub seller_rating: f64,
}

/// What the engine did for an alerted item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    #[default]
    Alert,
    Sniped,
    Failed,
}

/// One alert per (filter, item) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub filter_id: u64,
    pub owner_id: u64,
    pub item_id: String,
    pub title: String,
    pub price: f64,
    pub url: String,
    pub action: AlertAction,
    pub created_at: DateTime<Utc>,
}

impl AlertRecord {
    /// Build a fresh `alert` record for a newly seen item.
    pub fn new_alert(filter: &FilterSpec, item: &CatalogItem) -> Self {
        Self {
            filter_id: filter.id,
            owner_id: filter.owner_id,
            item_id: item.id.clone(),
            title: item.title.clone(),
            price: item.price,
            url: item.url.clone(),
            action: AlertAction::Alert,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Success,
    PriceTooHigh,
    Reserved,
    NotFound,
    TechnicalFailure,
    /// Sniping is switched off globally; nothing was fetched.
    Disabled,
}

impl PurchaseOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PriceTooHigh => "price_too_high",
            Self::Reserved => "reserved",
            Self::NotFound => "not_found",
            Self::TechnicalFailure => "technical_failure",
            Self::Disabled => "disabled",
        }
    }

    /// Alert action recorded for this outcome.
    pub fn alert_action(self) -> AlertAction {
        match self {
            Self::Success => AlertAction::Sniped,
            Self::TechnicalFailure | Self::NotFound => AlertAction::Failed,
            Self::PriceTooHigh | Self::Reserved | Self::Disabled => AlertAction::Alert,
        }
    }
}

/// Transient result of `PurchaseAttemptController::attempt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseAttemptResult {
    pub item_id: String,
    pub outcome: PurchaseOutcome,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
}

impl PurchaseAttemptResult {
    pub fn new(item_id: &str, outcome: PurchaseOutcome, detail: impl Into<String>) -> Self {
        Self {
            item_id: item_id.to_string(),
            outcome,
            timestamp: Utc::now(),
            detail: detail.into(),
        }
    }
}

/// Totals for one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub filters_processed: usize,
    pub items_found: usize,
    pub alerts_created: usize,
    pub errors: usize,
    pub snipes_attempted: usize,
}

impl ScanSummary {
    pub fn absorb(&mut self, other: &ScanSummary) {
        self.filters_processed += other.filters_processed;
        self.items_found += other.items_found;
        self.alerts_created += other.alerts_created;
        self.errors += other.errors;
        self.snipes_attempted += other.snipes_attempted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_spec_defaults_from_sparse_json() {
        let spec: FilterSpec =
            serde_json::from_str(r#"{"id": 7, "brands": ["nike"], "max_price": 50}"#).unwrap();
        assert_eq!(spec.id, 7);
        assert_eq!(spec.brands, vec!["nike".to_string()]);
        assert_eq!(spec.max_price, Some(50.0));
        assert!(spec.category.is_none());
        assert!(!spec.snipe_enabled);
        assert!(spec.active);
    }

    #[test]
    fn test_outcome_to_alert_action() {
        assert_eq!(PurchaseOutcome::Success.alert_action(), AlertAction::Sniped);
        assert_eq!(
            PurchaseOutcome::TechnicalFailure.alert_action(),
            AlertAction::Failed
        );
        assert_eq!(PurchaseOutcome::PriceTooHigh.alert_action(), AlertAction::Alert);
        assert_eq!(PurchaseOutcome::Disabled.as_str(), "disabled");
    }

    #[test]
    fn test_summary_absorb() {
        let mut total = ScanSummary::default();
        total.absorb(&ScanSummary {
            filters_processed: 1,
            items_found: 4,
            alerts_created: 2,
            errors: 0,
            snipes_attempted: 1,
        });
        total.absorb(&ScanSummary {
            filters_processed: 1,
            errors: 1,
            ..Default::default()
        });
        assert_eq!(total.filters_processed, 2);
        assert_eq!(total.items_found, 4);
        assert_eq!(total.errors, 1);
    }
}
