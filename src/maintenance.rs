//! Background upkeep: expired bucket sweeping and policy reloading.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ratelimit::{now_ms, PolicyTable, RateLimiter};

/// Periodically drop buckets whose window has elapsed.
pub async fn sweep_loop(limiter: Arc<RateLimiter>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval = ?every, "Bucket sweeper started");

    loop {
        ticker.tick().await;
        let removed = limiter.sweep_expired(now_ms());
        debug!(
            removed = removed,
            remaining = limiter.bucket_count(),
            "Swept expired buckets"
        );
    }
}

/// Re-read the policy file and swap it in when it parses and validates.
///
/// Returns whether the table was replaced. A failed reload keeps the
/// current table.
pub fn reload_policies(policies: &RwLock<PolicyTable>, path: &Path) -> bool {
    match PolicyTable::from_file(path) {
        Ok(table) => {
            let mut current = policies.write();
            if *current == table {
                return false;
            }
            info!(routes = table.len(), "Route policies reloaded");
            *current = table;
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to reload route policies, keeping previous");
            false
        }
    }
}

/// Periodically reload the policy file.
pub async fn reload_loop(policies: Arc<RwLock<PolicyTable>>, path: PathBuf, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the table was loaded at startup.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        reload_policies(&policies, &path);
    }
}
