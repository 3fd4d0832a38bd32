// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Engine event bus — typed events from every component.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`EngineEvent`] values. Notification delivery, dashboards and log
//! shippers subscribe independently. When no subscribers exist, events are
//! silently dropped.

use crate::model::{CatalogItem, PurchaseOutcome, ScanSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the engine emits. Serialized to JSON for downstream consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    // ── Scan Events ───────────────────────
    /// A scan cycle has started.
    ScanStarted { filters: usize, timestamp: String },
    /// A filter matched an item it had never alerted on.
    NewItem {
        filter_id: u64,
        owner_id: u64,
        item: CatalogItem,
    },
    /// A filter finished its pass.
    FilterScanned {
        filter_id: u64,
        items_found: usize,
        alerts_created: usize,
        elapsed_ms: u64,
    },
    /// A filter was skipped for this cycle.
    FilterFailed { filter_id: u64, error: String },
    /// The whole cycle finished (or was cancelled).
    ScanComplete {
        summary: ScanSummary,
        cancelled: bool,
        elapsed_ms: u64,
    },

    // ── Identity Events ───────────────────
    /// The proxy session was replaced.
    SessionRotated {
        reason: String,
        session: String,
        region: String,
    },
    /// The simulated client identity was regenerated.
    FingerprintRotated { generation: u64 },
    /// Upstream answered 429; the executor backed off.
    RateLimited { backoff_ms: u64, total_requests: u64 },
    /// Upstream answered 403; the executor is cooling down.
    Blocked { cooldown_ms: u64 },

    // ── Purchase Events ───────────────────
    /// A purchase attempt reached a terminal outcome.
    PurchaseAttempted {
        item_id: String,
        outcome: PurchaseOutcome,
        detail: String,
    },
}

/// The central event bus.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

/// RFC 3339 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = EngineEvent::FilterFailed {
            filter_id: 3,
            error: "rate limited by upstream".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"FilterFailed\""));
        assert!(json.contains("rate limited"));

        let parsed: EngineEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            EngineEvent::FilterFailed { filter_id, .. } => assert_eq!(filter_id, 3),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(EngineEvent::FingerprintRotated { generation: 1 });
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(EngineEvent::ScanStarted {
            filters: 2,
            timestamp: now_timestamp(),
        });

        match rx.try_recv().unwrap() {
            EngineEvent::ScanStarted { filters, .. } => assert_eq!(filters, 2),
            _ => panic!("wrong event"),
        }
    }

    #[test]
    fn test_scan_complete_carries_summary() {
        let event = EngineEvent::ScanComplete {
            summary: ScanSummary {
                filters_processed: 2,
                alerts_created: 1,
                ..Default::default()
            },
            cancelled: false,
            elapsed_ms: 12,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "ScanComplete");
        assert_eq!(value["summary"]["filters_processed"], 2);
        assert_eq!(value["cancelled"], false);
    }
}
