//! Simulated client identity presented with every request.

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Desktop browser user agents the fingerprint is drawn from.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:132.0) Gecko/20100101 Firefox/132.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:132.0) Gecko/20100101 Firefox/132.0",
];

/// One complete simulated client.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    /// Rotation counter of the owning provider.
    pub generation: u64,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
}

impl Fingerprint {
    pub fn generate(generation: u64) -> Self {
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
            .to_string();

        let headers = vec![
            ("user-agent".to_string(), user_agent.clone()),
            (
                "accept".to_string(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            ),
            (
                "accept-language".to_string(),
                "fr-FR,fr;q=0.9,en;q=0.8".to_string(),
            ),
            ("connection".to_string(), "keep-alive".to_string()),
            ("dnt".to_string(), "1".to_string()),
        ];

        Self {
            generation,
            user_agent,
            headers,
        }
    }

    /// Headers as a reqwest map. Invalid entries are skipped.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.insert(n, v);
            }
        }
        map
    }
}

/// Owns the active fingerprint and its proactive rotation cadence.
pub struct FingerprintProvider {
    current: RwLock<Arc<Fingerprint>>,
    generation: AtomicU64,
    served: AtomicU64,
    rotate_every: u64,
}

impl FingerprintProvider {
    pub fn new(rotate_every: u64) -> Self {
        Self {
            current: RwLock::new(Arc::new(Fingerprint::generate(0))),
            generation: AtomicU64::new(0),
            served: AtomicU64::new(0),
            rotate_every: rotate_every.max(1),
        }
    }

    /// Snapshot of the active fingerprint.
    pub fn headers(&self) -> Arc<Fingerprint> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Regenerate the whole identity.
    pub fn rotate(&self) -> Arc<Fingerprint> {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let next = Arc::new(Fingerprint::generate(generation));
        *slot = next.clone();
        self.served.store(0, Ordering::SeqCst);
        tracing::debug!(generation, user_agent = %next.user_agent, "rotated fingerprint");
        next
    }

    /// Count one request against the current fingerprint.
    pub(crate) fn record_request(&self) {
        self.served.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the proactive cadence says it's time to rotate.
    pub fn due(&self) -> bool {
        self.served.load(Ordering::Relaxed) >= self.rotate_every
    }

    pub fn rotations(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_headers() {
        let fp = Fingerprint::generate(0);
        assert!(USER_AGENTS.contains(&fp.user_agent.as_str()));
        let map = fp.header_map();
        assert_eq!(map.get("user-agent").unwrap(), fp.user_agent.as_str());
        assert_eq!(map.get("dnt").unwrap(), "1");
        assert!(map.get("accept-language").is_some());
    }

    #[test]
    fn test_cadence_and_rotation() {
        let provider = FingerprintProvider::new(2);
        assert!(!provider.due());
        provider.record_request();
        provider.record_request();
        assert!(provider.due());

        let before = provider.headers();
        let after = provider.rotate();
        assert_eq!(after.generation, before.generation + 1);
        assert!(!provider.due());
        assert_eq!(provider.rotations(), 1);
        assert_eq!(provider.headers().generation, 1);
    }
}
