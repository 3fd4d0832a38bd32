//! HTTP acquisition layer.
//!
//! Everything needed to turn a filter into catalog listings: proxy
//! sessions, client fingerprints, query construction, the request
//! executor with its recovery policy, and response parsing.

pub mod fingerprint;
pub mod http_client;
pub mod parser;
pub mod query;
pub mod session;
