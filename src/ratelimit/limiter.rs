//! Core rate limiter implementation.

use std::sync::Arc;
use tracing::trace;

use super::bucket::{now_ms, Decision};
use super::store::{BucketStore, MemoryStore};

/// Fixed-window rate limiter over a shared key space.
///
/// Each key gets an independent counter. A window opens on the first request
/// for a key and lasts `window_ms`; the first request at or after its end
/// opens a fresh window unconditionally. This struct is thread-safe and can
/// be shared across tasks behind an `Arc`.
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
}

impl RateLimiter {
    /// Create a rate limiter backed by a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Create a rate limiter over an existing bucket store.
    pub fn with_store(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }

    /// Check `key` against `limit` requests per `window_ms`, at wall-clock time.
    pub fn check(&self, key: &str, limit: u64, window_ms: u64) -> Decision {
        self.check_at(key, limit, window_ms, now_ms())
    }

    /// Check `key` against `limit` requests per `window_ms`, at `now` (epoch ms).
    ///
    /// Every call counts toward the window, admitted or not. Never fails.
    pub fn check_at(&self, key: &str, limit: u64, window_ms: u64, now: u64) -> Decision {
        let decision = self.store.hit(key, limit, window_ms, now);

        trace!(
            key = %key,
            ok = decision.ok,
            remaining = decision.remaining,
            limit = decision.limit,
            reset_at = decision.reset_at,
            "Rate limit checked"
        );

        decision
    }

    /// Get the current request count for a key, if its bucket exists.
    ///
    /// The bucket may already be expired; this does not roll it over.
    pub fn get_count(&self, key: &str) -> Option<u64> {
        self.store.get(key).map(|b| b.count)
    }

    /// Remove buckets whose window has elapsed at `now`.
    ///
    /// Never changes a later decision: the next request for a removed key
    /// would have opened a new window anyway.
    pub fn sweep_expired(&self, now: u64) -> usize {
        self.store.remove_expired(now)
    }

    /// Get the number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.store.len()
    }

    /// Clear all buckets.
    ///
    /// Only for isolating tests that share a limiter.
    #[cfg(any(test, feature = "test-util"))]
    pub fn reset_all(&self) {
        self.store.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
