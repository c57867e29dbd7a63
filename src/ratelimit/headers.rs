//! Standard rate limit response headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use super::bucket::Decision;

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Rendered header values for a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: String,
    pub remaining: String,
    /// Whole seconds until the window resets
    pub reset: String,
    pub retry_after: String,
}

impl RateLimitHeaders {
    /// Render `decision` relative to `now` (epoch ms).
    ///
    /// Seconds are rounded up and floored at zero, so a decision rendered
    /// after its window ended reports `0` rather than a negative value.
    pub fn render(decision: &Decision, now: u64) -> Self {
        let reset_secs = decision.reset_at.saturating_sub(now).div_ceil(1000);

        Self {
            limit: decision.limit.to_string(),
            remaining: decision.remaining.to_string(),
            reset: reset_secs.to_string(),
            retry_after: reset_secs.to_string(),
        }
    }

    /// Write the limit, remaining and reset headers into `headers`.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(LIMIT_HEADER, numeric_value(&self.limit));
        headers.insert(REMAINING_HEADER, numeric_value(&self.remaining));
        headers.insert(RESET_HEADER, numeric_value(&self.reset));
    }

    /// Write all headers including `Retry-After`, for rejected requests.
    pub fn apply_with_retry_after(&self, headers: &mut HeaderMap) {
        self.apply(headers);
        headers.insert(axum::http::header::RETRY_AFTER, numeric_value(&self.retry_after));
    }
}

fn numeric_value(value: &str) -> HeaderValue {
    // Rendered values are decimal digits, always valid header bytes.
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Render the header values for `decision` at `now`.
pub fn render_headers(decision: &Decision, now: u64) -> RateLimitHeaders {
    RateLimitHeaders::render(decision, now)
}
