//! Request executor wrapping reqwest.
//!
//! Sends every request through the current proxy session and fingerprint,
//! applies a human-like jitter before sending, classifies the response and
//! runs the recovery for detection signals: backoff plus session rotation on
//! 429, full identity rotation plus a long cooldown on 403. The executor
//! never retries a request itself; callers decide.

use crate::acquisition::fingerprint::{Fingerprint, FingerprintProvider};
use crate::acquisition::query::QuerySpec;
use crate::acquisition::session::{RotationReason, Session, SessionManager};
use crate::config::EngineConfig;
use crate::error::RequestError;
use crate::events::{EngineEvent, EventBus};
use rand::Rng;
use reqwest::header::{HeaderValue, ACCEPT, REFERER};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// A successful (2xx) upstream response.
#[derive(Debug, Clone)]
pub struct CatalogResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// A consistent pair of session and fingerprint.
#[derive(Debug, Clone)]
pub struct Identity {
    pub session: Arc<Session>,
    pub fingerprint: Arc<Fingerprint>,
}

impl Identity {
    /// Whether each half is the same `Arc` as in `other`.
    fn same_halves(&self, other: &Identity) -> (bool, bool) {
        (
            Arc::ptr_eq(&self.session, &other.session),
            Arc::ptr_eq(&self.fingerprint, &other.fingerprint),
        )
    }
}

/// Backoff after a 429: `min(cap, base × 2^min(exponent_cap, requests / 100))`.
pub fn rate_limit_backoff(config: &EngineConfig, total_requests: u64) -> Duration {
    let exponent = (total_requests / 100).min(config.backoff_exponent_cap as u64) as u32;
    let factor = 2u32.saturating_pow(exponent);
    config
        .backoff_base
        .saturating_mul(factor)
        .min(config.backoff_cap)
}

/// Uniform random duration in `[min, max]`.
pub fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let ms = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
    Duration::from_millis(ms as u64)
}

/// Issues catalog requests and owns the recovery policy.
pub struct RequestExecutor {
    config: EngineConfig,
    sessions: SessionManager,
    fingerprints: FingerprintProvider,
    /// The published (session, fingerprint) pair. Only replaced whole, and
    /// never held across an await.
    identity: RwLock<Identity>,
    total_requests: AtomicU64,
    events: Arc<EventBus>,
}

impl RequestExecutor {
    pub fn new(config: &EngineConfig, events: Arc<EventBus>) -> Self {
        let sessions = SessionManager::new(config);
        let fingerprints = FingerprintProvider::new(config.fingerprint_rotate_every);
        let identity = RwLock::new(Identity {
            session: sessions.current_session(),
            fingerprint: fingerprints.headers(),
        });
        Self {
            config: config.clone(),
            sessions,
            fingerprints,
            identity,
            total_requests: AtomicU64::new(0),
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn fingerprints(&self) -> &FingerprintProvider {
        &self.fingerprints
    }

    /// Requests issued over the executor's lifetime.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::SeqCst)
    }

    /// Consistent snapshot of the current identity.
    pub fn identity(&self) -> Identity {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the session and, if asked, the fingerprint.
    ///
    /// With a `seen` snapshot each half is only replaced while it is still
    /// the one the caller saw; a half another worker already replaced is
    /// left alone. Returns whether anything was rotated.
    pub fn rotate_identity(
        &self,
        reason: RotationReason,
        rotate_fingerprint: bool,
        seen: Option<&Identity>,
    ) -> bool {
        let (session, generation) = {
            let mut slot = self.identity.write().unwrap_or_else(PoisonError::into_inner);
            let (session_live, fingerprint_live) = seen.map_or((true, true), |s| s.same_halves(&slot));

            let session = session_live.then(|| self.sessions.rotate(reason));
            let fingerprint =
                (rotate_fingerprint && fingerprint_live).then(|| self.fingerprints.rotate());
            if let Some(session) = &session {
                slot.session = session.clone();
            }
            if let Some(fingerprint) = &fingerprint {
                slot.fingerprint = fingerprint.clone();
            }
            (session, fingerprint.map(|f| f.generation))
        };

        if let Some(session) = &session {
            self.events.emit(EngineEvent::SessionRotated {
                reason: reason.as_str().to_string(),
                session: session.token.clone(),
                region: session.region.as_str().to_string(),
            });
        }
        if let Some(generation) = generation {
            self.events.emit(EngineEvent::FingerprintRotated { generation });
        }
        session.is_some() || generation.is_some()
    }

    fn rotate_fingerprint_only(&self) {
        let generation = {
            let mut slot = self.identity.write().unwrap_or_else(PoisonError::into_inner);
            if !self.fingerprints.due() {
                return;
            }
            let fingerprint = self.fingerprints.rotate();
            slot.fingerprint = fingerprint.clone();
            fingerprint.generation
        };
        self.events.emit(EngineEvent::FingerprintRotated { generation });
    }

    /// Execute one request and classify the outcome.
    pub async fn execute(&self, query: &QuerySpec) -> Result<CatalogResponse, RequestError> {
        let total = self.total_requests.fetch_add(1, Ordering::SeqCst) + 1;

        if self.sessions.should_rotate() {
            let current = self.identity();
            if self.rotate_identity(RotationReason::Scheduled, false, Some(&current)) {
                tokio::time::sleep(jitter(
                    self.config.rotation_pause_min,
                    self.config.rotation_pause_max,
                ))
                .await;
            }
        } else if self.fingerprints.due() {
            self.rotate_fingerprint_only();
        }

        let identity = self.identity();
        identity.session.record_request();
        self.fingerprints.record_request();

        let url = query
            .url()
            .map_err(|e| RequestError::Network(format!("invalid url {}: {e}", query.endpoint)))?;

        tokio::time::sleep(jitter(self.config.delay_min, self.config.delay_max)).await;

        let mut headers = identity.fingerprint.header_map();
        headers.insert(ACCEPT, HeaderValue::from_static(query.kind.accept()));
        headers.insert(
            "x-requested-with",
            HeaderValue::from_static("XMLHttpRequest"),
        );
        if let Ok(value) = HeaderValue::from_str(&format!("{}/", self.config.base_url)) {
            headers.insert(REFERER, value);
        }

        let builder = identity.session.client().get(url.clone()).headers(headers);
        let resp = match builder.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                tracing::warn!(url = %url, "request timed out");
                return Err(RequestError::Timeout);
            }
            Err(e) => {
                tracing::warn!(url = %url, "request failed: {e}");
                return Err(RequestError::Network(e.to_string()));
            }
        };

        let status = resp.status().as_u16();
        match status {
            200..=299 => {
                let final_url = resp.url().to_string();
                let content_type = resp
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let body = resp.text().await.map_err(|e| {
                    if e.is_timeout() {
                        RequestError::Timeout
                    } else {
                        RequestError::Network(e.to_string())
                    }
                })?;
                tracing::debug!(
                    url = %final_url,
                    status,
                    bytes = body.len(),
                    session = %identity.session.token,
                    "request ok"
                );
                Ok(CatalogResponse {
                    url: final_url,
                    status,
                    content_type,
                    body,
                })
            }
            429 => {
                self.recover_rate_limit(total, &identity).await;
                Err(RequestError::RateLimited)
            }
            403 => {
                self.recover_ban(&identity).await;
                Err(RequestError::Blocked)
            }
            other => {
                tracing::warn!(url = %url, status = other, "unexpected upstream status");
                Err(RequestError::Unexpected(other))
            }
        }
    }

    /// 429: sleep the exponential backoff, then move to a new session.
    async fn recover_rate_limit(&self, total: u64, identity: &Identity) {
        let backoff = rate_limit_backoff(&self.config, total);
        tracing::warn!(
            backoff_ms = backoff.as_millis() as u64,
            total_requests = total,
            session = %identity.session.token,
            "rate limited, backing off and rotating session"
        );
        self.events.emit(EngineEvent::RateLimited {
            backoff_ms: backoff.as_millis() as u64,
            total_requests: total,
        });
        tokio::time::sleep(backoff).await;
        self.rotate_identity(RotationReason::RateLimit, false, Some(identity));
    }

    /// 403: replace session and fingerprint at once, then cool down.
    async fn recover_ban(&self, identity: &Identity) {
        tracing::warn!(session = %identity.session.token, "blocked, rotating full identity");
        self.rotate_identity(RotationReason::Blocked, true, Some(identity));
        let cooldown = jitter(self.config.ban_cooldown_min, self.config.ban_cooldown_max);
        self.events.emit(EngineEvent::Blocked {
            cooldown_ms: cooldown.as_millis() as u64,
        });
        tokio::time::sleep(cooldown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff_config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn test_backoff_formula() {
        let cfg = backoff_config();
        assert_eq!(rate_limit_backoff(&cfg, 0), Duration::from_secs(30));
        assert_eq!(rate_limit_backoff(&cfg, 99), Duration::from_secs(30));
        assert_eq!(rate_limit_backoff(&cfg, 100), Duration::from_secs(60));
        assert_eq!(rate_limit_backoff(&cfg, 250), Duration::from_secs(120));
        assert_eq!(rate_limit_backoff(&cfg, 300), Duration::from_secs(240));
        // exponent capped at 3
        assert_eq!(rate_limit_backoff(&cfg, 10_000), Duration::from_secs(240));
    }

    #[test]
    fn test_backoff_respects_cap() {
        let mut cfg = backoff_config();
        cfg.backoff_cap = Duration::from_secs(100);
        assert_eq!(rate_limit_backoff(&cfg, 300), Duration::from_secs(100));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let cfg = backoff_config();
        let mut last = Duration::ZERO;
        for requests in (0..2_000).step_by(7) {
            let next = rate_limit_backoff(&cfg, requests);
            assert!(next >= last, "backoff decreased at {requests}");
            assert!(next <= cfg.backoff_cap);
            last = next;
        }
    }

    #[test]
    fn test_jitter_bounds() {
        let min = Duration::from_millis(10);
        let max = Duration::from_millis(20);
        for _ in 0..100 {
            let d = jitter(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(jitter(max, min), max);
        assert_eq!(jitter(Duration::ZERO, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_rotate_identity_skips_stale_snapshot() {
        let exec = RequestExecutor::new(&EngineConfig::instant(), Arc::new(EventBus::default()));
        let seen = exec.identity();
        assert!(exec.rotate_identity(RotationReason::Blocked, true, Some(&seen)));
        // a second worker reporting the same stale identity does not rotate again
        assert!(!exec.rotate_identity(RotationReason::Blocked, true, Some(&seen)));
        assert_eq!(exec.sessions().rotations(), 1);
        assert_eq!(exec.fingerprints().rotations(), 1);
    }

    #[test]
    fn test_block_after_scheduled_rotation_still_replaces_fingerprint() {
        let exec = RequestExecutor::new(&EngineConfig::instant(), Arc::new(EventBus::default()));
        let blocked = exec.identity();

        // another worker moved to a new session while the blocked request was in flight
        let now = exec.identity();
        assert!(exec.rotate_identity(RotationReason::Scheduled, false, Some(&now)));

        assert!(exec.rotate_identity(RotationReason::Blocked, true, Some(&blocked)));
        let after = exec.identity();
        assert!(!Arc::ptr_eq(&after.fingerprint, &blocked.fingerprint));
        assert_eq!(after.fingerprint.generation, 1);
        // the session was already fresh and is kept
        assert_eq!(exec.sessions().rotations(), 1);
        assert_eq!(after.session.epoch, 1);
    }

    #[test]
    fn test_identity_tracks_managers() {
        let exec = RequestExecutor::new(&EngineConfig::instant(), Arc::new(EventBus::default()));
        exec.rotate_identity(RotationReason::RateLimit, false, None);
        let identity = exec.identity();
        assert!(Arc::ptr_eq(&identity.session, &exec.sessions().current_session()));
        assert!(Arc::ptr_eq(&identity.fingerprint, &exec.fingerprints().headers()));
        assert_eq!(identity.fingerprint.generation, 0);
    }
}
