// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Collaborator boundaries consumed by the engine.
//!
//! Filter storage, alert persistence, feature flags, credentials and real
//! checkout all live outside the engine. These traits are the seams; the
//! submodules provide in-memory and file-backed implementations used by the
//! binary and the tests.

pub mod filters;
pub mod journal;
pub mod memory;

use crate::error::{PersistenceError, PurchaseError};
use crate::model::{AlertAction, AlertRecord, FilterSpec, ItemDetails};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

pub use filters::{FileFilterSource, StaticFilterSource};
pub use journal::AlertJournal;
pub use memory::MemoryAlertStore;

/// Source of the filters to scan.
#[async_trait]
pub trait FilterSource: Send + Sync {
    async fn list_active_filters(&self) -> Result<Vec<FilterSpec>, PersistenceError>;
}

/// Persisted alerts, keyed by (filter id, item id).
///
/// Each call stands alone; no transaction spans a cycle.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn alert_exists(&self, filter_id: u64, item_id: &str) -> Result<bool, PersistenceError>;

    async fn create_alert(&self, record: &AlertRecord) -> Result<(), PersistenceError>;

    /// Record what the engine did after the alert was created.
    async fn set_action(
        &self,
        filter_id: u64,
        item_id: &str,
        action: AlertAction,
    ) -> Result<(), PersistenceError>;
}

/// Global switches.
pub trait FeatureFlags: Send + Sync {
    fn sniping_enabled(&self) -> bool;
}

/// Checkout credentials per filter owner.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credential_for(&self, owner_id: u64) -> Result<Option<String>, PersistenceError>;
}

/// The real checkout. Returns a human-readable detail on success.
#[async_trait]
pub trait PurchaseExecutor: Send + Sync {
    async fn purchase(
        &self,
        item: &ItemDetails,
        max_price: f64,
        credential: &str,
    ) -> Result<String, PurchaseError>;
}

/// Fixed flag values.
#[derive(Debug, Clone, Copy)]
pub struct StaticFlags {
    pub sniping: bool,
}

impl FeatureFlags for StaticFlags {
    fn sniping_enabled(&self) -> bool {
        self.sniping
    }
}

/// Flags that can be flipped at runtime.
#[derive(Debug)]
pub struct AtomicFlags {
    sniping: AtomicBool,
}

impl AtomicFlags {
    pub fn new(sniping: bool) -> Self {
        Self {
            sniping: AtomicBool::new(sniping),
        }
    }

    pub fn set_sniping(&self, enabled: bool) {
        self.sniping.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "sniping flag changed");
    }
}

impl FeatureFlags for AtomicFlags {
    fn sniping_enabled(&self) -> bool {
        self.sniping.load(Ordering::SeqCst)
    }
}

/// Credentials held in memory, with an optional fallback token.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    tokens: HashMap<u64, String>,
    fallback: Option<String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same token for every owner.
    pub fn shared(token: impl Into<String>) -> Self {
        Self {
            tokens: HashMap::new(),
            fallback: Some(token.into()),
        }
    }

    pub fn with(mut self, owner_id: u64, token: impl Into<String>) -> Self {
        self.tokens.insert(owner_id, token.into());
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn credential_for(&self, owner_id: u64) -> Result<Option<String>, PersistenceError> {
        Ok(self
            .tokens
            .get(&owner_id)
            .cloned()
            .or_else(|| self.fallback.clone()))
    }
}

/// Checkout placeholder used when no real checkout is wired in.
pub struct NoCheckout;

#[async_trait]
impl PurchaseExecutor for NoCheckout {
    async fn purchase(
        &self,
        _item: &ItemDetails,
        _max_price: f64,
        _credential: &str,
    ) -> Result<String, PurchaseError> {
        Err(PurchaseError::NotConfigured)
    }
}
