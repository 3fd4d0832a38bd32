//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use snipe_runtime::error::PurchaseError;
use snipe_runtime::model::{FilterSpec, ItemDetails};
use snipe_runtime::store::PurchaseExecutor;
use snipe_runtime::EngineConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::{MockServer, ResponseTemplate};

pub const CATALOG_PATH: &str = "/api/v2/catalog/items";

/// Zero-delay config pointed at the mock server.
pub fn config(server: &MockServer) -> EngineConfig {
    EngineConfig::instant().with_base_url(&server.uri())
}

pub fn json_response(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json")
}

pub fn html_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

pub fn api_item(id: u64, title: &str, price: f64) -> Value {
    json!({
        "id": id,
        "title": title,
        "price": {"amount": format!("{price:.2}"), "currency_code": "EUR"},
        "brand_title": "Nike",
        "size_title": "42",
        "user": {"id": 501, "login": "seller501"},
        "is_visible": true,
        "is_reserved": false
    })
}

pub fn catalog(items: Vec<Value>) -> Value {
    json!({ "items": items })
}

pub fn details(id: u64, price: f64, reserved: bool) -> Value {
    json!({
        "item": {
            "id": id,
            "title": "Nike Air Max 90",
            "price": {"amount": format!("{price:.2}"), "currency_code": "EUR"},
            "description": "Worn twice",
            "is_visible": true,
            "is_reserved": reserved
        }
    })
}

pub fn nike_filter(id: u64) -> FilterSpec {
    FilterSpec {
        id,
        owner_id: 7,
        name: "nike under 50".into(),
        brands: vec!["nike".into()],
        max_price: Some(50.0),
        ..Default::default()
    }
}

/// Checkout double that counts calls.
pub struct RecordingCheckout {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl RecordingCheckout {
    pub fn succeeding() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PurchaseExecutor for RecordingCheckout {
    async fn purchase(
        &self,
        item: &ItemDetails,
        _max_price: f64,
        _credential: &str,
    ) -> Result<String, PurchaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(PurchaseError::Rejected("card declined".into()))
        } else {
            Ok(format!("order placed for {}", item.item.id))
        }
    }
}
