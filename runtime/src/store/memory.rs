//! In-memory alert store.

use super::AlertStore;
use crate::error::PersistenceError;
use crate::model::{AlertAction, AlertRecord};
use async_trait::async_trait;
use dashmap::DashMap;

/// Alerts kept in a concurrent map keyed by (filter id, item id).
#[derive(Debug, Default)]
pub struct MemoryAlertStore {
    alerts: DashMap<(u64, String), AlertRecord>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn get(&self, filter_id: u64, item_id: &str) -> Option<AlertRecord> {
        self.alerts
            .get(&(filter_id, item_id.to_string()))
            .map(|r| r.value().clone())
    }

    /// All records, ordered by (filter id, item id).
    pub fn records(&self) -> Vec<AlertRecord> {
        let mut out: Vec<AlertRecord> = self.alerts.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| (a.filter_id, &a.item_id).cmp(&(b.filter_id, &b.item_id)));
        out
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn alert_exists(&self, filter_id: u64, item_id: &str) -> Result<bool, PersistenceError> {
        Ok(self.alerts.contains_key(&(filter_id, item_id.to_string())))
    }

    async fn create_alert(&self, record: &AlertRecord) -> Result<(), PersistenceError> {
        // first write wins; the pair stays unique
        self.alerts
            .entry((record.filter_id, record.item_id.clone()))
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn set_action(
        &self,
        filter_id: u64,
        item_id: &str,
        action: AlertAction,
    ) -> Result<(), PersistenceError> {
        match self.alerts.get_mut(&(filter_id, item_id.to_string())) {
            Some(mut record) => {
                record.action = action;
                Ok(())
            }
            None => Err(PersistenceError::Unavailable(format!(
                "no alert for filter {filter_id} item {item_id}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CatalogItem, FilterSpec, ItemSource};

    fn item(id: &str) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            title: "Air Max".into(),
            price: 45.0,
            currency: "EUR".into(),
            size: String::new(),
            brand: "Nike".into(),
            condition: String::new(),
            url: format!("https://www.vinted.fr/items/{id}"),
            photo_url: String::new(),
            seller_id: 0,
            seller_login: String::new(),
            location: String::new(),
            created_at: None,
            updated_at: None,
            visible: true,
            reserved: false,
            source: ItemSource::Api,
        }
    }

    #[tokio::test]
    async fn test_create_is_unique_per_pair() {
        let store = MemoryAlertStore::new();
        let filter = FilterSpec {
            id: 1,
            ..Default::default()
        };
        let record = AlertRecord::new_alert(&filter, &item("123"));
        assert!(!store.alert_exists(1, "123").await.unwrap());
        store.create_alert(&record).await.unwrap();
        store.create_alert(&record).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.alert_exists(1, "123").await.unwrap());
        assert!(!store.alert_exists(2, "123").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_action() {
        let store = MemoryAlertStore::new();
        let filter = FilterSpec {
            id: 4,
            ..Default::default()
        };
        store
            .create_alert(&AlertRecord::new_alert(&filter, &item("9")))
            .await
            .unwrap();
        store.set_action(4, "9", AlertAction::Sniped).await.unwrap();
        assert_eq!(store.get(4, "9").unwrap().action, AlertAction::Sniped);
        assert!(store.set_action(4, "10", AlertAction::Failed).await.is_err());
    }
}
