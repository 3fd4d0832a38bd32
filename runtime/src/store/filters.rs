//! Filter sources: fixed in-memory list and a JSON file on disk.

use super::FilterSource;
use crate::error::PersistenceError;
use crate::model::FilterSpec;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A fixed set of filters.
#[derive(Debug, Clone, Default)]
pub struct StaticFilterSource {
    filters: Vec<FilterSpec>,
}

impl StaticFilterSource {
    pub fn new(filters: Vec<FilterSpec>) -> Self {
        Self { filters }
    }
}

#[async_trait]
impl FilterSource for StaticFilterSource {
    async fn list_active_filters(&self) -> Result<Vec<FilterSpec>, PersistenceError> {
        Ok(self.filters.iter().filter(|f| f.active).cloned().collect())
    }
}

/// Filters read from a JSON array file, re-read on every cycle so edits are
/// picked up without a restart.
#[derive(Debug, Clone)]
pub struct FileFilterSource {
    path: PathBuf,
}

impl FileFilterSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FilterSource for FileFilterSource {
    async fn list_active_filters(&self) -> Result<Vec<FilterSpec>, PersistenceError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let filters: Vec<FilterSpec> = serde_json::from_str(&raw)?;
        let total = filters.len();
        let active: Vec<FilterSpec> = filters.into_iter().filter(|f| f.active).collect();
        tracing::debug!(
            path = %self.path.display(),
            total,
            active = active.len(),
            "loaded filters"
        );
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_returns_active_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.json");
        std::fs::write(
            &path,
            r#"[
                {"id": 1, "brands": ["nike"], "max_price": 50},
                {"id": 2, "active": false},
                {"id": 3, "keywords": "jean"}
            ]"#,
        )
        .unwrap();

        let filters = FileFilterSource::new(&path)
            .list_active_filters()
            .await
            .unwrap();
        let ids: Vec<u64> = filters.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_file_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileFilterSource::new(dir.path().join("nope.json"));
        assert!(matches!(
            missing.list_active_filters().await,
            Err(PersistenceError::Io(_))
        ));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileFilterSource::new(&path).list_active_filters().await,
            Err(PersistenceError::Serde(_))
        ));
    }

    #[tokio::test]
    async fn test_static_source_skips_inactive() {
        let source = StaticFilterSource::new(vec![
            FilterSpec {
                id: 1,
                ..Default::default()
            },
            FilterSpec {
                id: 2,
                active: false,
                ..Default::default()
            },
        ]);
        assert_eq!(source.list_active_filters().await.unwrap().len(), 1);
    }
}
