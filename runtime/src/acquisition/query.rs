//! Translate filters into upstream catalog queries.
//!
//! Filter dimensions are mapped to upstream ids through a [`CatalogTaxonomy`].
//! Names the taxonomy doesn't know are dropped, which widens the search
//! instead of failing it.

use crate::model::FilterSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Name → upstream id lookup tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogTaxonomy {
    pub categories: HashMap<String, u64>,
    pub brands: HashMap<String, u64>,
    pub sizes: HashMap<String, u64>,
    pub colors: HashMap<String, u64>,
    pub materials: HashMap<String, u64>,
    pub conditions: HashMap<String, u64>,
}

fn table(entries: &[(&str, u64)]) -> HashMap<String, u64> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

impl CatalogTaxonomy {
    /// Built-in ids known for the upstream catalog. Intentionally partial.
    pub fn seeded() -> Self {
        Self {
            categories: table(&[
                ("women", 1),
                ("men", 2),
                ("kids", 3),
                ("home", 4),
                ("entertainment", 5),
            ]),
            brands: table(&[("zara", 53), ("h&m", 49), ("nike", 88), ("adidas", 14)]),
            sizes: HashMap::new(),
            colors: HashMap::new(),
            materials: HashMap::new(),
            conditions: table(&[
                ("new_with_tags", 6),
                ("new_without_tags", 1),
                ("very_good", 2),
                ("good", 3),
                ("satisfactory", 4),
            ]),
        }
    }

    /// Load a taxonomy from a JSON file with any subset of the tables.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read taxonomy file: {}", path.display()))?;
        let parsed: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid taxonomy file: {}", path.display()))?;
        Ok(parsed.normalized())
    }

    /// Overlay `other` on top of `self`; entries in `other` win.
    pub fn merge(mut self, other: CatalogTaxonomy) -> Self {
        let other = other.normalized();
        self.categories.extend(other.categories);
        self.brands.extend(other.brands);
        self.sizes.extend(other.sizes);
        self.colors.extend(other.colors);
        self.materials.extend(other.materials);
        self.conditions.extend(other.conditions);
        self
    }

    fn normalized(self) -> Self {
        let norm = |m: HashMap<String, u64>| -> HashMap<String, u64> {
            m.into_iter().map(|(k, v)| (normalize(&k), v)).collect()
        };
        Self {
            categories: norm(self.categories),
            brands: norm(self.brands),
            sizes: norm(self.sizes),
            colors: norm(self.colors),
            materials: norm(self.materials),
            conditions: norm(self.conditions),
        }
    }
}

/// Map names through a table, dropping unknown ones.
fn map_ids(kind: &str, names: &[String], table: &HashMap<String, u64>) -> Vec<u64> {
    names
        .iter()
        .filter_map(|name| {
            let id = table.get(&normalize(name)).copied();
            if id.is_none() {
                tracing::debug!("no upstream id for {kind} {name:?}; omitting");
            }
            id
        })
        .collect()
}

/// What a query fetches. Decides the `Accept` header sent with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Catalog,
    ItemDetails,
}

impl QueryKind {
    /// Catalog searches may come back as a rendered page; details are JSON only.
    pub fn accept(self) -> &'static str {
        match self {
            Self::Catalog => "application/json, text/plain, */*",
            Self::ItemDetails => "application/json",
        }
    }
}

/// Upstream request: endpoint plus ordered query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub kind: QueryKind,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

impl QuerySpec {
    /// Full URL with encoded parameters.
    pub fn url(&self) -> std::result::Result<Url, url::ParseError> {
        if self.params.is_empty() {
            Url::parse(&self.endpoint)
        } else {
            Url::parse_with_params(&self.endpoint, &self.params)
        }
    }

    /// All values for a parameter, in order.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Builds catalog and item-details queries.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    api_base: String,
    currency: String,
    page_size: u32,
    taxonomy: Arc<CatalogTaxonomy>,
}

impl QueryBuilder {
    pub fn new(api_base: &str, currency: &str, page_size: u32, taxonomy: Arc<CatalogTaxonomy>) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            currency: currency.to_string(),
            page_size,
            taxonomy,
        }
    }

    pub fn taxonomy(&self) -> &CatalogTaxonomy {
        &self.taxonomy
    }

    /// Catalog search for one filter, newest first, cache-busted.
    pub fn build(&self, filter: &FilterSpec) -> QuerySpec {
        let tax = &self.taxonomy;
        let mut params: Vec<(String, String)> = vec![
            ("time".into(), chrono::Utc::now().timestamp().to_string()),
            ("per_page".into(), self.page_size.to_string()),
            ("order".into(), "newest_first".into()),
        ];

        if let Some(category) = filter.category.as_deref() {
            match tax.categories.get(&normalize(category)) {
                Some(id) => params.push(("category_id".into(), id.to_string())),
                None => tracing::debug!("no upstream id for category {category:?}; omitting"),
            }
        }

        let lists: [(&str, &str, &[String], &HashMap<String, u64>); 5] = [
            ("brand", "brand_ids[]", &filter.brands, &tax.brands),
            ("size", "size_ids[]", &filter.sizes, &tax.sizes),
            ("color", "color_ids[]", &filter.colors, &tax.colors),
            ("material", "material_ids[]", &filter.materials, &tax.materials),
            ("condition", "status_ids[]", &filter.conditions, &tax.conditions),
        ];
        for (kind, key, names, table) in lists {
            for id in map_ids(kind, names, table) {
                params.push((key.into(), id.to_string()));
            }
        }

        if let Some(min) = filter.min_price {
            params.push(("price_from".into(), min.to_string()));
        }
        if let Some(max) = filter.max_price {
            params.push(("price_to".into(), max.to_string()));
        }
        params.push(("currency".into(), self.currency.clone()));

        if let Some(keywords) = filter.keywords.as_deref().map(str::trim) {
            if !keywords.is_empty() {
                params.push(("search_text".into(), keywords.to_string()));
            }
        }

        QuerySpec {
            kind: QueryKind::Catalog,
            endpoint: format!("{}/catalog/items", self.api_base),
            params,
        }
    }

    /// Details lookup for a single listing.
    pub fn item_details(&self, item_id: &str) -> QuerySpec {
        QuerySpec {
            kind: QueryKind::ItemDetails,
            endpoint: format!("{}/items/{}", self.api_base, item_id.trim()),
            params: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(
            "https://www.vinted.fr/api/v2/",
            "EUR",
            96,
            Arc::new(CatalogTaxonomy::seeded()),
        )
    }

    #[test]
    fn test_fixed_params_always_present() {
        let q = builder().build(&FilterSpec::default());
        assert_eq!(q.endpoint, "https://www.vinted.fr/api/v2/catalog/items");
        assert_eq!(q.values("per_page"), vec!["96"]);
        assert_eq!(q.values("order"), vec!["newest_first"]);
        assert_eq!(q.values("currency"), vec!["EUR"]);
        assert_eq!(q.values("time").len(), 1);
        assert!(q.values("search_text").is_empty());
    }

    #[test]
    fn test_maps_known_names_and_omits_unknown() {
        let filter = FilterSpec {
            category: Some("Women".into()),
            brands: vec!["Nike".into(), "unknown-brand".into(), "adidas".into()],
            conditions: vec!["very_good".into()],
            colors: vec!["red".into()],
            min_price: Some(5.0),
            max_price: Some(50.0),
            keywords: Some("  air max ".into()),
            ..Default::default()
        };
        let q = builder().build(&filter);
        assert_eq!(q.values("category_id"), vec!["1"]);
        assert_eq!(q.values("brand_ids[]"), vec!["88", "14"]);
        assert_eq!(q.values("status_ids[]"), vec!["2"]);
        assert!(q.values("color_ids[]").is_empty());
        assert_eq!(q.values("price_from"), vec!["5"]);
        assert_eq!(q.values("price_to"), vec!["50"]);
        assert_eq!(q.values("search_text"), vec!["air max"]);

        let url = q.url().unwrap();
        assert!(url.as_str().contains("brand_ids%5B%5D=88"));
        assert!(url.as_str().contains("search_text=air+max"));
    }

    #[test]
    fn test_unknown_category_is_omitted() {
        let filter = FilterSpec {
            category: Some("spaceships".into()),
            ..Default::default()
        };
        assert!(builder().build(&filter).values("category_id").is_empty());
    }

    #[test]
    fn test_taxonomy_merge_extends_tables() {
        let extra: CatalogTaxonomy =
            serde_json::from_str(r#"{"colors": {"Red": 7}, "brands": {"nike": 99}}"#).unwrap();
        let tax = CatalogTaxonomy::seeded().merge(extra);
        assert_eq!(tax.colors.get("red"), Some(&7));
        assert_eq!(tax.brands.get("nike"), Some(&99));
        assert_eq!(tax.brands.get("zara"), Some(&53));
    }

    #[test]
    fn test_taxonomy_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(&path, r#"{"sizes": {"M": 207}}"#).unwrap();
        let tax = CatalogTaxonomy::from_json_file(&path).unwrap();
        assert_eq!(tax.sizes.get("m"), Some(&207));
        assert!(tax.brands.is_empty());
    }

    #[test]
    fn test_item_details_query() {
        let q = builder().item_details("123");
        assert_eq!(q.kind, QueryKind::ItemDetails);
        assert_eq!(q.kind.accept(), "application/json");
        assert_eq!(builder().build(&FilterSpec::default()).kind, QueryKind::Catalog);
        assert_eq!(q.url().unwrap().as_str(), "https://www.vinted.fr/api/v2/items/123");
    }
}
