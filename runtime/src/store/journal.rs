//! JSONL alert journal — append-only alert store backed by one file.
//!
//! Every alert write appends one line holding the full record. A later line
//! for the same (filter, item) pair supersedes earlier ones, which is how
//! `set_action` is recorded. On open the journal is replayed so dedup keys
//! survive restarts. When the file grows past `MAX_JOURNAL_SIZE` it is
//! compacted to one line per pair.

use super::AlertStore;
use crate::error::PersistenceError;
use crate::model::{AlertAction, AlertRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Journal size that triggers compaction (64 MB).
const MAX_JOURNAL_SIZE: u64 = 64 * 1024 * 1024;

struct Writer {
    file: File,
    /// Approximate current size (re-read on compaction).
    current_size: u64,
}

/// File-backed [`AlertStore`].
pub struct AlertJournal {
    path: PathBuf,
    records: DashMap<(u64, String), AlertRecord>,
    writer: Mutex<Writer>,
}

impl AlertJournal {
    /// Open or create the journal, replaying existing lines.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let records = DashMap::new();
        if path.exists() {
            let reader = BufReader::new(
                File::open(path)
                    .with_context(|| format!("failed to read alert journal: {}", path.display()))?,
            );
            let mut skipped = 0usize;
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AlertRecord>(&line) {
                    Ok(record) => {
                        records.insert((record.filter_id, record.item_id.clone()), record);
                    }
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                tracing::warn!(path = %path.display(), skipped, "skipped unreadable journal lines");
            }
        }

        let file = open_append(path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        tracing::debug!(path = %path.display(), alerts = records.len(), "opened alert journal");

        Ok(Self {
            path: path.to_path_buf(),
            records,
            writer: Mutex::new(Writer { file, current_size }),
        })
    }

    /// Open the default journal at ~/.snipe/alerts.jsonl.
    pub fn default_journal() -> Result<Self> {
        Self::open(&default_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, filter_id: u64, item_id: &str) -> Option<AlertRecord> {
        self.records
            .get(&(filter_id, item_id.to_string()))
            .map(|r| r.value().clone())
    }

    fn append(&self, record: &AlertRecord) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if writer.current_size >= MAX_JOURNAL_SIZE {
            self.compact(&mut writer)?;
        }
        writeln!(writer.file, "{json}")?;
        writer.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Rewrite the journal with the latest line per pair.
    fn compact(&self, writer: &mut Writer) -> Result<(), PersistenceError> {
        writer.file.flush()?;
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let mut out = File::create(&tmp)?;
            for entry in self.records.iter() {
                writeln!(out, "{}", serde_json::to_string(entry.value())?)?;
            }
            out.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        writer.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writer.current_size = writer.file.metadata().map(|m| m.len()).unwrap_or(0);
        tracing::info!(path = %self.path.display(), alerts = self.records.len(), "compacted alert journal");
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open alert journal: {}", path.display()))
}

/// ~/.snipe/alerts.jsonl, or /tmp when there is no home directory.
pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".snipe")
        .join("alerts.jsonl")
}

#[async_trait]
impl AlertStore for AlertJournal {
    async fn alert_exists(&self, filter_id: u64, item_id: &str) -> Result<bool, PersistenceError> {
        Ok(self.records.contains_key(&(filter_id, item_id.to_string())))
    }

    async fn create_alert(&self, record: &AlertRecord) -> Result<(), PersistenceError> {
        let key = (record.filter_id, record.item_id.clone());
        if self.records.contains_key(&key) {
            return Ok(());
        }
        // written to disk before it becomes visible to dedup
        self.append(record)?;
        self.records.insert(key, record.clone());
        Ok(())
    }

    async fn set_action(
        &self,
        filter_id: u64,
        item_id: &str,
        action: AlertAction,
    ) -> Result<(), PersistenceError> {
        let mut updated = self.get(filter_id, item_id).ok_or_else(|| {
            PersistenceError::Unavailable(format!("no alert for filter {filter_id} item {item_id}"))
        })?;
        updated.action = action;
        self.append(&updated)?;
        self.records
            .insert((filter_id, item_id.to_string()), updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CatalogItem, FilterSpec, ItemSource};

    fn record(filter_id: u64, item_id: &str) -> AlertRecord {
        let filter = FilterSpec {
            id: filter_id,
            owner_id: 42,
            ..Default::default()
        };
        let item = CatalogItem {
            id: item_id.to_string(),
            title: "Veste en jean".into(),
            price: 20.0,
            currency: "EUR".into(),
            size: "M".into(),
            brand: "Levi's".into(),
            condition: String::new(),
            url: format!("https://www.vinted.fr/items/{item_id}"),
            photo_url: String::new(),
            seller_id: 1,
            seller_login: String::new(),
            location: String::new(),
            created_at: None,
            updated_at: None,
            visible: true,
            reserved: false,
            source: ItemSource::Api,
        };
        AlertRecord::new_alert(&filter, &item)
    }

    #[tokio::test]
    async fn test_journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("alerts.jsonl");

        {
            let journal = AlertJournal::open(&path).unwrap();
            journal.create_alert(&record(1, "100")).await.unwrap();
            journal.create_alert(&record(1, "100")).await.unwrap();
            journal.create_alert(&record(2, "100")).await.unwrap();
            journal.set_action(1, "100", AlertAction::Sniped).await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);

        let reopened = AlertJournal::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.alert_exists(1, "100").await.unwrap());
        assert!(!reopened.alert_exists(3, "100").await.unwrap());
        assert_eq!(reopened.get(1, "100").unwrap().action, AlertAction::Sniped);
        assert_eq!(reopened.get(2, "100").unwrap().action, AlertAction::Alert);
    }

    #[tokio::test]
    async fn test_journal_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let good = serde_json::to_string(&record(5, "7")).unwrap();
        std::fs::write(&path, format!("not json\n\n{good}\n")).unwrap();

        let journal = AlertJournal::open(&path).unwrap();
        assert_eq!(journal.len(), 1);
        assert!(journal.alert_exists(5, "7").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_action_unknown_pair() {
        let dir = tempfile::tempdir().unwrap();
        let journal = AlertJournal::open(&dir.path().join("a.jsonl")).unwrap();
        assert!(matches!(
            journal.set_action(1, "1", AlertAction::Failed).await,
            Err(PersistenceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_default_path() {
        let path = default_path();
        assert!(path.ends_with(".snipe/alerts.jsonl"));
    }
}
