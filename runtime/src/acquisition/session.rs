//! Sticky proxy sessions and their rotation policy.
//!
//! A [`Session`] is an immutable outbound identity: a sticky proxy token, the
//! region it exits from, and the HTTP client bound to that proxy. Rotation
//! never edits a session; it builds a new one and swaps the `Arc`.

use crate::config::EngineConfig;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Proxy exit regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Region {
    FR,
    DE,
    ES,
    IT,
    BE,
}

impl Region {
    pub const ALL: [Region; 5] = [Region::FR, Region::DE, Region::ES, Region::IT, Region::BE];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FR => "FR",
            Self::DE => "DE",
            Self::ES => "ES",
            Self::IT => "IT",
            Self::BE => "BE",
        }
    }
}

/// Cities used to pin French sessions further.
const FR_CITIES: [&str; 4] = ["paris", "lyon", "marseille", "bordeaux"];

/// How long the proxy keeps the same exit node for a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StickyDuration {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    OneDay,
}

impl StickyDuration {
    pub const ALL: [StickyDuration; 4] = [
        StickyDuration::OneHour,
        StickyDuration::SixHours,
        StickyDuration::TwelveHours,
        StickyDuration::OneDay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::TwelveHours => "12h",
            Self::OneDay => "24h",
        }
    }
}

/// Why a session was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    /// Age, request count, or random chance.
    Scheduled,
    RateLimit,
    Blocked,
}

impl RotationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::RateLimit => "rate-limit",
            Self::Blocked => "blocked",
        }
    }
}

/// One sticky proxy session.
pub struct Session {
    /// Sticky session token sent to the proxy.
    pub token: String,
    pub region: Region,
    pub city: Option<&'static str>,
    pub sticky: StickyDuration,
    pub started_at: DateTime<Utc>,
    /// Monotonic rotation counter of the owning manager.
    pub epoch: u64,
    created: Instant,
    request_count: AtomicU64,
    client: reqwest::Client,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token)
            .field("region", &self.region)
            .field("sticky", &self.sticky)
            .field("epoch", &self.epoch)
            .field("request_count", &self.request_count())
            .finish()
    }
}

impl Session {
    /// Build a session with a fresh randomized token and its own client.
    pub fn generate(config: &EngineConfig, epoch: u64) -> Self {
        let mut rng = rand::thread_rng();
        let region = *Region::ALL.choose(&mut rng).unwrap_or(&Region::FR);
        let city = match region {
            Region::FR => FR_CITIES.choose(&mut rng).copied(),
            _ => None,
        };
        let sticky = *StickyDuration::ALL
            .choose(&mut rng)
            .unwrap_or(&StickyDuration::OneHour);
        let started_at = Utc::now();

        let mut token = format!(
            "vinted_{}_{}_country-{}",
            started_at.timestamp(),
            rng.gen_range(1000..=9999),
            region.as_str()
        );
        if let Some(city) = city {
            token.push_str(&format!("_city-{city}"));
        }
        token.push_str(&format!("_sessionduration-{}", sticky.as_str()));

        let client = build_client(config, &token);

        Self {
            token,
            region,
            city,
            sticky,
            started_at,
            epoch,
            created: Instant::now(),
            request_count: AtomicU64::new(0),
            client,
        }
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Requests sent through this session so far.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// HTTP client bound to this session's proxy identity.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Build the outbound client for one session.
///
/// Client construction failures degrade to a default client; rotation itself
/// never fails.
fn build_client(config: &EngineConfig, token: &str) -> reqwest::Client {
    let mut builder = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .redirect(reqwest::redirect::Policy::limited(5));

    if config.proxy.enabled() {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(token) {
            headers.insert("x-smartproxy-session", value);
        }
        builder = builder.default_headers(headers);

        match reqwest::Proxy::all(config.proxy.url()) {
            Ok(proxy) => {
                builder = builder
                    .proxy(proxy.basic_auth(&config.proxy.username, &config.proxy.password));
            }
            Err(e) => {
                tracing::warn!(endpoint = %config.proxy.endpoint, "invalid proxy endpoint: {e}");
            }
        }
    } else {
        builder = builder.no_proxy();
    }

    builder.build().unwrap_or_default()
}

/// Point-in-time description of the active session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub token: String,
    pub region: Region,
    pub city: Option<String>,
    pub sticky: StickyDuration,
    pub started_at: DateTime<Utc>,
    pub age_secs: u64,
    pub request_count: u64,
    pub epoch: u64,
    pub endpoint: Option<String>,
}

/// Owns the active session and decides when to replace it.
///
/// Reads hand out an `Arc` snapshot; `rotate` swaps in a fully built
/// replacement under the write lock.
pub struct SessionManager {
    config: EngineConfig,
    current: RwLock<Arc<Session>>,
    epoch: AtomicU64,
}

impl SessionManager {
    pub fn new(config: &EngineConfig) -> Self {
        let mut config = config.clone();
        config.rotation_chance = config.rotation_chance.clamp(0.0, 1.0);
        let first = Session::generate(&config, 0);
        Self {
            config,
            current: RwLock::new(Arc::new(first)),
            epoch: AtomicU64::new(0),
        }
    }

    /// Snapshot of the active session.
    pub fn current_session(&self) -> Arc<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Time-or-chance rotation check.
    ///
    /// True when the session is older than the max age, has served its
    /// request quota, or the random draw hits `rotation_chance`.
    pub fn should_rotate(&self) -> bool {
        let session = self.current_session();
        if session.age() > self.config.session_max_age {
            return true;
        }
        if session.request_count() >= self.config.session_request_limit {
            return true;
        }
        self.config.rotation_chance > 0.0
            && rand::thread_rng().gen_bool(self.config.rotation_chance)
    }

    /// Replace the session wholesale and return the new one.
    pub fn rotate(&self, reason: RotationReason) -> Arc<Session> {
        let next = {
            let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            let next = Arc::new(Session::generate(&self.config, epoch));
            *slot = next.clone();
            next
        };
        tracing::info!(
            session = %next.token,
            region = next.region.as_str(),
            city = next.city.unwrap_or("-"),
            duration = next.sticky.as_str(),
            reason = reason.as_str(),
            "rotated proxy session"
        );
        next
    }

    /// Number of rotations performed so far.
    pub fn rotations(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> SessionInfo {
        let s = self.current_session();
        SessionInfo {
            token: s.token.clone(),
            region: s.region,
            city: s.city.map(String::from),
            sticky: s.sticky,
            started_at: s.started_at,
            age_secs: s.age().as_secs(),
            request_count: s.request_count(),
            epoch: s.epoch,
            endpoint: self
                .config
                .proxy
                .enabled()
                .then(|| self.config.proxy.endpoint.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> EngineConfig {
        EngineConfig::instant()
    }

    #[test]
    fn test_token_format() {
        let session = Session::generate(&quiet_config(), 0);
        assert!(session.token.starts_with("vinted_"));
        assert!(session.token.contains(&format!("_country-{}", session.region.as_str())));
        assert!(session
            .token
            .ends_with(&format!("_sessionduration-{}", session.sticky.as_str())));
        match session.region {
            Region::FR => {
                let city = session.city.unwrap();
                assert!(session.token.contains(&format!("_city-{city}")));
            }
            _ => assert!(session.city.is_none()),
        }
    }

    #[test]
    fn test_fresh_session_does_not_rotate_without_chance() {
        let manager = SessionManager::new(&quiet_config());
        assert!(!manager.should_rotate());
    }

    #[test]
    fn test_rotates_when_age_exceeded() {
        let mut cfg = quiet_config();
        cfg.session_max_age = Duration::ZERO;
        let manager = SessionManager::new(&cfg);
        std::thread::sleep(Duration::from_millis(2));
        assert!(manager.should_rotate());
    }

    #[test]
    fn test_always_rotates_with_full_chance() {
        let mut cfg = quiet_config();
        cfg.rotation_chance = 1.0;
        let manager = SessionManager::new(&cfg);
        assert!(manager.should_rotate());
    }

    #[test]
    fn test_request_limit_triggers_rotation_and_resets() {
        let mut cfg = quiet_config();
        cfg.session_request_limit = 3;
        let manager = SessionManager::new(&cfg);
        let session = manager.current_session();
        for _ in 0..3 {
            session.record_request();
        }
        assert!(manager.should_rotate());

        let next = manager.rotate(RotationReason::Scheduled);
        assert_eq!(next.request_count(), 0);
        assert_eq!(next.epoch, 1);
        assert!(!manager.should_rotate());
    }

    #[test]
    fn test_rotate_replaces_wholesale() {
        let manager = SessionManager::new(&quiet_config());
        let before = manager.current_session();
        let after = manager.rotate(RotationReason::Blocked);
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&after, &manager.current_session()));
        // the old snapshot is untouched
        assert_eq!(before.epoch, 0);
        assert_eq!(manager.rotations(), 1);
        assert_eq!(manager.info().epoch, 1);
    }
}
