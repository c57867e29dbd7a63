//! Bucket storage behind the rate limiter.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::bucket::{Bucket, Decision};

/// Trait for bucket store implementations.
///
/// `hit` must perform its read-modify-write atomically for a given key:
/// two concurrent hits on one key may never both observe the same count.
pub trait BucketStore: Send + Sync {
    /// Record a request for `key` at `now` and decide whether it is admitted.
    fn hit(&self, key: &str, limit: u64, window_ms: u64, now: u64) -> Decision;

    /// Current bucket for `key`, if one exists.
    fn get(&self, key: &str) -> Option<Bucket>;

    /// Drop every bucket whose window has elapsed at `now`.
    ///
    /// Returns the number of buckets removed.
    fn remove_expired(&self, now: u64) -> usize;

    /// Drop every bucket.
    fn clear(&self);

    /// Number of live buckets.
    fn len(&self) -> usize;

    /// Whether the store holds no buckets.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store on a sharded concurrent map.
///
/// `hit` runs under the shard write lock for its key, so the whole
/// check-then-increment sequence is atomic per key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: DashMap<String, Bucket>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Count a request against a live bucket, reopening it if its window elapsed.
///
/// The caller holds the key's shard write lock.
fn advance(key: &str, bucket: &mut Bucket, limit: u64, window_ms: u64, now: u64) -> Decision {
    if bucket.is_expired(now) {
        *bucket = Bucket::open(now, window_ms);
        debug!(key = %key, reset_at = bucket.reset_at, "Window elapsed, opening new window");
        return bucket.opening_decision(limit);
    }
    bucket.increment();
    bucket.decide(limit)
}

impl BucketStore for MemoryStore {
    fn hit(&self, key: &str, limit: u64, window_ms: u64, now: u64) -> Decision {
        // Existing keys are updated in place without allocating the key.
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return advance(key, &mut bucket, limit, window_ms, now);
        }

        match self.buckets.entry(key.to_string()) {
            Entry::Occupied(mut entry) => advance(key, entry.get_mut(), limit, window_ms, now),
            Entry::Vacant(entry) => {
                let bucket = Bucket::open(now, window_ms);
                entry.insert(bucket);
                debug!(key = %key, reset_at = bucket.reset_at, "Creating new bucket");
                bucket.opening_decision(limit)
            }
        }
    }

    fn get(&self, key: &str) -> Option<Bucket> {
        self.buckets.get(key).map(|b| *b)
    }

    fn remove_expired(&self, now: u64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_expired(now));
        before.saturating_sub(self.buckets.len())
    }

    fn clear(&self) {
        self.buckets.clear();
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }
}
