// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Engine configuration.
//!
//! Every tunable the engine uses lives in [`EngineConfig`]. Defaults are the
//! production values; `SNIPE_*` environment variables override them.

use crate::error::ConfigError;
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://www.vinted.fr";
const DEFAULT_API_BASE: &str = "https://www.vinted.fr/api/v2";
const DEFAULT_PROXY_ENDPOINT: &str = "gate.smartproxy.com:7000";

/// Upstream proxy credentials. Proxying is off when `username` is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl ProxyConfig {
    pub fn enabled(&self) -> bool {
        !self.username.is_empty() && !self.endpoint.is_empty()
    }

    /// Proxy URL without credentials (they go through basic auth).
    pub fn url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

/// All engine tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub base_url: String,
    pub api_base: String,
    pub currency: String,
    pub page_size: u32,

    /// Human-like delay applied before each request.
    pub delay_min: Duration,
    pub delay_max: Duration,

    pub session_max_age: Duration,
    /// Probability of a rotation on each `should_rotate` check.
    pub rotation_chance: f64,
    /// Rotate the session after this many requests through it.
    pub session_request_limit: u64,
    /// Regenerate the fingerprint after this many requests.
    pub fingerprint_rotate_every: u64,
    /// Settle time after any rotation.
    pub rotation_pause_min: Duration,
    pub rotation_pause_max: Duration,

    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub backoff_exponent_cap: u32,
    pub ban_cooldown_min: Duration,
    pub ban_cooldown_max: Duration,

    pub request_timeout: Duration,
    /// Maximum number of filters scanned concurrently.
    pub workers: usize,
    pub sniping_enabled: bool,
    pub proxy: ProxyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            currency: "EUR".to_string(),
            page_size: 96,
            delay_min: Duration::from_secs(2),
            delay_max: Duration::from_secs(5),
            session_max_age: Duration::from_secs(30 * 60),
            rotation_chance: 0.10,
            session_request_limit: 50,
            fingerprint_rotate_every: 25,
            rotation_pause_min: Duration::from_secs(5),
            rotation_pause_max: Duration::from_secs(10),
            backoff_base: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(300),
            backoff_exponent_cap: 3,
            ban_cooldown_min: Duration::from_secs(60),
            ban_cooldown_max: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            workers: 10,
            sniping_enabled: true,
            proxy: ProxyConfig {
                endpoint: DEFAULT_PROXY_ENDPOINT.to_string(),
                username: String::new(),
                password: String::new(),
            },
        }
    }
}

impl EngineConfig {
    /// Defaults with every sleep set to zero and random rotation off.
    ///
    /// Meant for tests and local replay against a mock upstream.
    pub fn instant() -> Self {
        Self {
            delay_min: Duration::ZERO,
            delay_max: Duration::ZERO,
            rotation_chance: 0.0,
            rotation_pause_min: Duration::ZERO,
            rotation_pause_max: Duration::ZERO,
            backoff_base: Duration::ZERO,
            backoff_cap: Duration::ZERO,
            ban_cooldown_min: Duration::ZERO,
            ban_cooldown_max: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Point both the site root and the API at `base` (used with mock servers).
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.base_url = base.to_string();
        self.api_base = format!("{base}/api/v2");
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: &str| ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        };
        for (key, value) in [("base_url", &self.base_url), ("api_base", &self.api_base)] {
            match Url::parse(value) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                _ => return Err(invalid(key, value.as_str())),
            }
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(invalid("currency", &self.currency));
        }
        if !self.proxy.username.is_empty() && self.proxy.endpoint.is_empty() {
            return Err(invalid("proxy.endpoint", ""));
        }
        Ok(())
    }

    /// Defaults overlaid with `SNIPE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// Unparseable values keep the default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let ms = |key: &str, default: Duration| {
            Duration::from_millis(read_u64(&lookup, key, default.as_millis() as u64))
        };
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(read_u64(&lookup, key, default.as_secs()))
        };

        let delay_min = ms("SNIPE_DELAY_MIN_MS", d.delay_min);
        let rotation_pause_min = ms("SNIPE_ROTATION_PAUSE_MIN_MS", d.rotation_pause_min);
        let ban_cooldown_min = secs("SNIPE_BAN_COOLDOWN_MIN_SECS", d.ban_cooldown_min);

        Self {
            base_url: read_string(&lookup, "SNIPE_BASE_URL").unwrap_or(d.base_url),
            api_base: read_string(&lookup, "SNIPE_API_BASE").unwrap_or(d.api_base),
            currency: read_string(&lookup, "SNIPE_CURRENCY").unwrap_or(d.currency),
            page_size: read_u64(&lookup, "SNIPE_PAGE_SIZE", d.page_size as u64).max(1) as u32,
            delay_min,
            delay_max: ms("SNIPE_DELAY_MAX_MS", d.delay_max).max(delay_min),
            session_max_age: secs("SNIPE_SESSION_MAX_AGE_SECS", d.session_max_age),
            rotation_chance: read_f64(&lookup, "SNIPE_ROTATION_CHANCE", d.rotation_chance)
                .clamp(0.0, 1.0),
            session_request_limit: read_u64(
                &lookup,
                "SNIPE_SESSION_REQUEST_LIMIT",
                d.session_request_limit,
            )
            .max(1),
            fingerprint_rotate_every: read_u64(
                &lookup,
                "SNIPE_FINGERPRINT_ROTATE_EVERY",
                d.fingerprint_rotate_every,
            )
            .max(1),
            rotation_pause_min,
            rotation_pause_max: ms("SNIPE_ROTATION_PAUSE_MAX_MS", d.rotation_pause_max)
                .max(rotation_pause_min),
            backoff_base: secs("SNIPE_BACKOFF_BASE_SECS", d.backoff_base),
            backoff_cap: secs("SNIPE_BACKOFF_CAP_SECS", d.backoff_cap),
            backoff_exponent_cap: read_u64(
                &lookup,
                "SNIPE_BACKOFF_EXPONENT_CAP",
                d.backoff_exponent_cap as u64,
            )
            .min(16) as u32,
            ban_cooldown_min,
            ban_cooldown_max: secs("SNIPE_BAN_COOLDOWN_MAX_SECS", d.ban_cooldown_max)
                .max(ban_cooldown_min),
            request_timeout: secs("SNIPE_REQUEST_TIMEOUT_SECS", d.request_timeout),
            workers: read_u64(&lookup, "SNIPE_WORKERS", d.workers as u64).max(1) as usize,
            sniping_enabled: read_bool(&lookup, "SNIPE_SNIPING_ENABLED", d.sniping_enabled),
            proxy: ProxyConfig {
                endpoint: read_string(&lookup, "SNIPE_PROXY_ENDPOINT")
                    .unwrap_or(d.proxy.endpoint),
                username: read_string(&lookup, "SNIPE_PROXY_USERNAME").unwrap_or_default(),
                password: read_string(&lookup, "SNIPE_PROXY_PASSWORD").unwrap_or_default(),
            },
        }
    }
}

fn read_string<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_u64<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, default: u64) -> u64 {
    match read_string(lookup, name) {
        Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
            tracing::warn!("ignoring invalid {name}={raw:?}, using {default}");
            default
        }),
        None => default,
    }
}

fn read_f64<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, default: f64) -> f64 {
    match read_string(lookup, name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                tracing::warn!("ignoring invalid {name}={raw:?}, using {default}");
                default
            }
        },
        None => default,
    }
}

fn read_bool<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, default: bool) -> bool {
    match read_string(lookup, name).map(|v| v.to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            tracing::warn!("ignoring invalid {name}={v:?}, using {default}");
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_validate() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::instant()
            .with_base_url("http://127.0.0.1:8080")
            .validate()
            .is_ok());

        let bad_url = EngineConfig::default().with_base_url("not a url");
        match bad_url.validate() {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "base_url"),
            other => panic!("unexpected {other:?}"),
        }

        let bad_currency = EngineConfig {
            currency: "euro".into(),
            ..EngineConfig::default()
        };
        assert!(bad_currency.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.session_max_age, Duration::from_secs(1800));
        assert_eq!(cfg.rotation_chance, 0.10);
        assert_eq!(cfg.page_size, 96);
        assert_eq!(cfg.backoff_cap, Duration::from_secs(300));
        assert!(!cfg.proxy.enabled());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("SNIPE_WORKERS", "3"),
            ("SNIPE_DELAY_MIN_MS", "100"),
            ("SNIPE_DELAY_MAX_MS", "250"),
            ("SNIPE_SNIPING_ENABLED", "off"),
            ("SNIPE_PROXY_USERNAME", "user"),
        ]));
        assert_eq!(cfg.workers, 3);
        assert_eq!(cfg.delay_min, Duration::from_millis(100));
        assert_eq!(cfg.delay_max, Duration::from_millis(250));
        assert!(!cfg.sniping_enabled);
        assert!(cfg.proxy.enabled());
        assert_eq!(cfg.proxy.url(), "http://gate.smartproxy.com:7000");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("SNIPE_WORKERS", "many"),
            ("SNIPE_ROTATION_CHANCE", "7.5"),
            ("SNIPE_DELAY_MIN_MS", "9000"),
            ("SNIPE_DELAY_MAX_MS", "10"),
        ]));
        assert_eq!(cfg.workers, 10);
        assert_eq!(cfg.rotation_chance, 1.0);
        // max never drops below min
        assert_eq!(cfg.delay_max, cfg.delay_min);
    }

    #[test]
    fn test_with_base_url() {
        let cfg = EngineConfig::instant().with_base_url("http://127.0.0.1:9999/");
        assert_eq!(cfg.base_url, "http://127.0.0.1:9999");
        assert_eq!(cfg.api_base, "http://127.0.0.1:9999/api/v2");
        assert_eq!(cfg.delay_max, Duration::ZERO);
    }
}
