//! Rate limiting logic and state management.

mod bucket;
mod headers;
mod key;
mod limiter;
mod rules;
mod store;

pub use bucket::{now_ms, Bucket, Decision};
pub use headers::{render_headers, RateLimitHeaders, LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER};
pub use key::{derive_key, extract_client_ip, BucketKey, FORWARDED_FOR, REAL_IP, UNKNOWN_CLIENT};
pub use limiter::RateLimiter;
pub use rules::{PolicyTable, RoutePolicy, DEFAULT_WINDOW_MS};
pub use store::{BucketStore, MemoryStore};
