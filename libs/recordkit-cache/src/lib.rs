#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Concurrent string-keyed TTL cache.
//!
//! [`TtlCache`] keeps values with a sliding expiry and deduplicates
//! concurrent fetches of the same key. Fetches run as detached tasks, so a
//! caller that gives up never cancels work other callers are waiting on.

mod error;
mod ttl;

pub use error::FetchError;
pub use ttl::TtlCache;
