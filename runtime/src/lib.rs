// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Snipe runtime library — marketplace acquisition engine.
//!
//! Scans user filters against the upstream catalog through rotating proxy
//! sessions, records an alert for every newly listed match and optionally
//! runs a guarded purchase attempt.

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod purchase;
pub mod store;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{PersistenceError, PurchaseError, RequestError};
pub use model::{AlertRecord, CatalogItem, FilterSpec, PurchaseAttemptResult, ScanSummary};
pub use orchestrator::{AcquisitionOrchestrator, SnipeHook};
pub use purchase::PurchaseAttemptController;
