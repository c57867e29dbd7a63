//! Fixed-window bucket and the decision it produces.

use serde::{Deserialize, Serialize};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Per-key counter for one fixed window.
///
/// `count` includes rejected attempts, so a client hammering past the limit
/// keeps occupying the window until `reset_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Requests observed since the window opened
    pub count: u64,
    /// Epoch milliseconds at which the window ends
    pub reset_at: u64,
}

impl Bucket {
    /// Open a new window at `now` holding the request that opened it.
    pub fn open(now: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_at: now.saturating_add(window_ms),
        }
    }

    /// Whether the window has elapsed at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.reset_at <= now
    }

    /// Record one more request in the current window.
    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Build the decision for the request just recorded against `limit`.
    pub fn decide(&self, limit: u64) -> Decision {
        let ok = self.count <= limit;
        Decision {
            ok,
            remaining: if ok { limit - self.count } else { 0 },
            limit,
            reset_at: self.reset_at,
        }
    }

    /// Decision for the request that opened this window.
    ///
    /// The opening request is always admitted, even with `limit` 0.
    pub fn opening_decision(&self, limit: u64) -> Decision {
        Decision {
            ok: true,
            remaining: limit.saturating_sub(1),
            limit,
            reset_at: self.reset_at,
        }
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the request is admitted
    pub ok: bool,
    /// Requests left in the current window
    pub remaining: u64,
    /// Configured maximum per window
    pub limit: u64,
    /// Epoch milliseconds at which the current window ends
    pub reset_at: u64,
}
