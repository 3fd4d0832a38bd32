//! Turn raw catalog responses into normalized items.
//!
//! Two stages with a fixed precedence: when the response claims to be JSON,
//! decode the API payload; if that fails, or the response is a rendered
//! page, scrape the markup with ordered CSS selector candidates. Parsing
//! never errors out. Malformed input yields fewer items and a log line.

use crate::model::{CatalogItem, ItemDetails, ItemSource};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Item container candidates, tried in order; the first with a match wins.
const CONTAINER_SELECTORS: &[&str] = &[".feed-grid__item", ".item-box", r#"[data-testid="item"]"#];

const TITLE_SELECTORS: &[&str] = &[r#"[data-testid="item-title"]"#, ".item-title", "h3"];
const PRICE_SELECTORS: &[&str] = &[r#"[data-testid="item-price"]"#, ".item-price", ".price"];
const IMAGE_SELECTORS: &[&str] = &[r#"img[data-testid="item-photo"]"#, ".item-photo img", "img"];
const BRAND_SELECTORS: &[&str] = &[r#"[data-testid="item-brand"]"#, ".item-brand"];
const SIZE_SELECTORS: &[&str] = &[r#"[data-testid="item-size"]"#, ".item-size"];

/// Attributes that carry the listing id on a container element.
const ID_ATTRIBUTES: &[&str] = &["data-item-id", "data-testid-item-id"];

/// Compiled selector candidates, built once per process.
struct MarkupSelectors {
    container: Vec<Selector>,
    title: Vec<Selector>,
    price: Vec<Selector>,
    image: Vec<Selector>,
    brand: Vec<Selector>,
    size: Vec<Selector>,
    link: Selector,
}

fn compile(candidates: &[&str]) -> Vec<Selector> {
    candidates
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

fn selectors() -> &'static MarkupSelectors {
    static SELECTORS: OnceLock<MarkupSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| MarkupSelectors {
        container: compile(CONTAINER_SELECTORS),
        title: compile(TITLE_SELECTORS),
        price: compile(PRICE_SELECTORS),
        image: compile(IMAGE_SELECTORS),
        brand: compile(BRAND_SELECTORS),
        size: compile(SIZE_SELECTORS),
        link: Selector::parse("a[href]").expect("link selector is valid"),
    })
}

/// Why the structured stage gave up.
#[derive(thiserror::Error, Debug)]
enum StructuredError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload has no `items` array")]
    MissingItems,
}

/// Converts response bodies into [`CatalogItem`]s.
#[derive(Debug, Clone)]
pub struct ResultParser {
    base_url: String,
    currency: String,
}

impl ResultParser {
    pub fn new(base_url: &str, currency: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            currency: currency.to_string(),
        }
    }

    /// Parse a catalog response. Never fails; see module docs.
    pub fn parse(&self, body: &str, content_type: &str) -> Vec<CatalogItem> {
        if is_structured(content_type) {
            match self.parse_structured(body) {
                Ok(items) => return items,
                Err(reason) => {
                    tracing::warn!(%reason, "structured decode failed, falling back to markup");
                }
            }
        }
        self.parse_markup(body)
    }

    fn parse_structured(&self, body: &str) -> Result<Vec<CatalogItem>, StructuredError> {
        let value: Value = serde_json::from_str(body)?;
        let records = value
            .get("items")
            .and_then(|i| i.as_array())
            .ok_or(StructuredError::MissingItems)?;

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            match self.map_api_item(record) {
                Some(item) => items.push(item),
                None => tracing::debug!("dropping API record without id"),
            }
        }
        Ok(items)
    }

    /// Fixed API field mapping. Missing numbers become 0, missing strings "".
    fn map_api_item(&self, v: &Value) -> Option<CatalogItem> {
        let id = value_to_id(v.get("id")?)?;
        let (price, currency) = api_price(v);
        let user = v.get("user");

        Some(CatalogItem {
            url: format!("{}/items/{}", self.base_url, id),
            id,
            title: str_field(v, "title"),
            price: price.unwrap_or(0.0),
            currency: if currency.is_empty() {
                self.currency.clone()
            } else {
                currency
            },
            size: str_field(v, "size_title"),
            brand: str_field(v, "brand_title"),
            condition: str_field(v, "status"),
            photo_url: first_photo_url(v),
            seller_id: user
                .and_then(|u| u.get("id"))
                .and_then(|id| id.as_u64())
                .unwrap_or(0),
            seller_login: user.map(|u| str_field(u, "login")).unwrap_or_default(),
            location: user.map(|u| str_field(u, "city")).unwrap_or_default(),
            created_at: v.get("created_at_ts").and_then(parse_timestamp),
            updated_at: v.get("updated_at_ts").and_then(parse_timestamp),
            visible: v.get("is_visible").and_then(|b| b.as_bool()).unwrap_or(true),
            reserved: v.get("is_reserved").and_then(|b| b.as_bool()).unwrap_or(false),
            source: ItemSource::Api,
        })
    }

    fn parse_markup(&self, body: &str) -> Vec<CatalogItem> {
        let document = Html::parse_document(body);

        let containers: Vec<ElementRef<'_>> = selectors()
            .container
            .iter()
            .map(|sel| document.select(sel).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default();

        if containers.is_empty() {
            tracing::debug!("no item containers matched in markup");
            return Vec::new();
        }

        containers
            .iter()
            .filter_map(|el| self.extract_markup_item(el))
            .collect()
    }

    /// One container → item. Missing id, title, or url drops it.
    fn extract_markup_item(&self, el: &ElementRef<'_>) -> Option<CatalogItem> {
        let id = ID_ATTRIBUTES
            .iter()
            .find_map(|a| el.value().attr(a))
            .map(str::trim)
            .filter(|s| !s.is_empty())?
            .to_string();
        let sel = selectors();
        let title = text_by_selectors(el, &sel.title).filter(|t| !t.is_empty())?;
        let url = first_link(el).map(|href| self.absolutize(&href))?;

        let price = text_by_selectors(el, &sel.price)
            .map(|t| extract_price(&t))
            .unwrap_or(0.0);

        let photo_url = sel
            .image
            .iter()
            .find_map(|s| el.select(s).next())
            .and_then(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
            .unwrap_or_default()
            .to_string();

        Some(CatalogItem {
            id,
            title,
            price,
            currency: self.currency.clone(),
            size: text_by_selectors(el, &sel.size).unwrap_or_default(),
            brand: text_by_selectors(el, &sel.brand).unwrap_or_default(),
            condition: String::new(),
            url,
            photo_url,
            seller_id: 0,
            seller_login: String::new(),
            location: String::new(),
            created_at: None,
            updated_at: None,
            visible: true,
            reserved: false,
            source: ItemSource::Markup,
        })
    }

    fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        url::Url::parse(&format!("{}/", self.base_url))
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.base_url, href))
    }

    /// Decode an item-details payload (`{"item": {...}}`).
    ///
    /// `None` when the body isn't JSON or carries no item.
    pub fn parse_item_details(&self, body: &str) -> Option<ItemDetails> {
        let value: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("item details payload is not JSON: {e}");
                return None;
            }
        };
        let raw = value.get("item").filter(|i| i.is_object())?;
        let item = self.map_api_item(raw)?;

        let photos = raw
            .get("photos")
            .and_then(|p| p.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|p| p.get("url").and_then(|u| u.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let measurements: BTreeMap<String, String> = raw
            .get("item_details")
            .and_then(|d| d.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|d| {
                        let title = d.get("title").and_then(value_to_text)?;
                        let value = d.get("value").and_then(value_to_text)?;
                        (!title.is_empty() && !value.is_empty()).then_some((title, value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let user = raw.get("user");
        Some(ItemDetails {
            price_known: api_price(raw).0.is_some(),
            description: str_field(raw, "description"),
            color: str_field(raw, "color1"),
            material: raw.get("material").and_then(value_to_text).unwrap_or_default(),
            photos,
            measurements,
            view_count: raw.get("view_count").and_then(|n| n.as_u64()).unwrap_or(0),
            favourite_count: raw
                .get("favourite_count")
                .and_then(|n| n.as_u64())
                .unwrap_or(0),
            seller_rating: user
                .and_then(|u| u.get("feedback_reputation"))
                .and_then(as_number)
                .unwrap_or(0.0),
            item,
        })
    }
}

/// Whether a Content-Type announces a machine-readable payload.
pub fn is_structured(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("application/json") || ct.contains("+json")
}

fn price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d.,]*").expect("price regex is valid"))
}

/// Extract a price from display text such as `"1 234,50 €"` or `"$1,234.50"`.
///
/// The last `.`/`,` is the decimal point when one or two digits follow it,
/// or when both separator kinds appear; every other separator groups
/// thousands. No number yields `0.0`.
pub fn extract_price(text: &str) -> f64 {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();
    let Some(m) = price_regex().find(&compact) else {
        return 0.0;
    };
    let raw = m.as_str().trim_end_matches(&['.', ','][..]);

    let both = raw.contains('.') && raw.contains(',');
    let decimal_at = raw.rfind(&['.', ','][..]).filter(|&i| {
        let tail = raw.len() - i - 1;
        both || (1..=2).contains(&tail)
    });

    let normalized: String = raw
        .char_indices()
        .filter_map(|(i, c)| match c {
            '.' | ',' if Some(i) == decimal_at => Some('.'),
            '.' | ',' => None,
            _ => Some(c),
        })
        .collect();

    normalized.parse::<f64>().unwrap_or(0.0)
}

fn as_number(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n: &f64| n.is_finite())
}

/// Price and currency of an API record. Both the `{"amount", "currency_code"}`
/// object and a bare scalar are accepted; anything unparseable is `None`.
fn api_price(v: &Value) -> (Option<f64>, String) {
    match v.get("price") {
        Some(p) if p.is_object() => (
            p.get("amount").and_then(as_number),
            str_field(p, "currency_code"),
        ),
        Some(p) => (as_number(p), str_field(v, "currency")),
        None => (None, str_field(v, "currency")),
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_string()
}

fn value_to_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(o) => o.get("title").and_then(value_to_text),
        _ => None,
    }
}

fn value_to_id(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn first_photo_url(v: &Value) -> String {
    v.get("photos")
        .and_then(|p| p.as_array())
        .and_then(|arr| arr.first())
        .or_else(|| v.get("photo"))
        .and_then(|p| p.get("url"))
        .and_then(|u| u.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Unix seconds (number or numeric string) or RFC 3339.
fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    if let Some(secs) = v.as_i64() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    let s = v.as_str()?.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first selector candidate that matches inside `el`.
fn text_by_selectors(el: &ElementRef<'_>, candidates: &[Selector]) -> Option<String> {
    candidates
        .iter()
        .find_map(|sel| el.select(sel).next())
        .map(|found| element_text(&found))
}

fn first_link(el: &ElementRef<'_>) -> Option<String> {
    if el.value().name() == "a" {
        if let Some(href) = el.value().attr("href") {
            return Some(href.to_string()).filter(|h| !h.trim().is_empty());
        }
    }
    el.select(&selectors().link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}
