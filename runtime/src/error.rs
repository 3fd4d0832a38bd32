// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the acquisition engine.
//!
//! Every error here is recoverable. The orchestrator decides per filter
//! whether to log and skip; nothing in the engine aborts the process.

/// Failure of a single catalog request, already classified.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Upstream answered 429. Backoff and session rotation already ran.
    #[error("rate limited by upstream")]
    RateLimited,

    /// Upstream answered 403. Session and fingerprint were both replaced.
    #[error("blocked by upstream (anti-bot)")]
    Blocked,

    #[error("request timed out")]
    Timeout,

    #[error("unexpected upstream status {0}")]
    Unexpected(u16),

    /// Transport failure that is neither a timeout nor an HTTP status.
    #[error("network error: {0}")]
    Network(String),
}

/// Failure reported by an external persistence collaborator.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure reported by the external checkout collaborator.
#[derive(thiserror::Error, Debug)]
pub enum PurchaseError {
    #[error("purchase rejected: {0}")]
    Rejected(String),

    #[error("no checkout executor configured")]
    NotConfigured,

    #[error("checkout transport error: {0}")]
    Transport(String),
}

/// Invalid configuration input.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            RequestError::Unexpected(502).to_string(),
            "unexpected upstream status 502"
        );
        let err = PersistenceError::Unavailable("db down".into());
        assert!(err.to_string().contains("db down"));
    }
}
