//! Axum middleware gating a route behind the rate limiter.
//!
//! ```ignore
//! let gate = RouteGate::new("act-grocery", RoutePolicy::per_minute(8), limiter);
//! let app = Router::new()
//!     .route("/api/act/grocery", post(grocery))
//!     .route_layer(middleware::from_fn_with_state(gate, enforce));
//! ```

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::ratelimit::{
    derive_key, extract_client_ip, now_ms, render_headers, Decision, RateLimiter, RoutePolicy,
};

/// Body message returned with every 429.
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Try again shortly.";

/// A named route, its policy, and the limiter enforcing it.
#[derive(Clone)]
pub struct RouteGate {
    route: Arc<str>,
    policy: RoutePolicy,
    limiter: Arc<RateLimiter>,
}

impl RouteGate {
    /// Gate `route` with `policy`. Gates sharing a limiter keep separate buckets per route.
    pub fn new(route: impl Into<Arc<str>>, policy: RoutePolicy, limiter: Arc<RateLimiter>) -> Self {
        Self {
            route: route.into(),
            policy,
            limiter,
        }
    }

    /// Record a request from `client` at `now` against this route's bucket.
    pub fn check_at(&self, client: Option<&str>, now: u64) -> Decision {
        let key = derive_key(client, &self.route);
        self.limiter
            .check_at(&key, self.policy.limit, self.policy.window_ms, now)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

/// The 429 response for a rejected decision, rendered at `now`.
pub fn rejection_response(decision: &Decision, now: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            error: RATE_LIMITED_MESSAGE,
        }),
    )
        .into_response();

    render_headers(decision, now).apply_with_retry_after(response.headers_mut());
    response
}

/// Rate limit the wrapped route per client.
///
/// Rejected requests get a 429 with `Retry-After`; admitted requests run the
/// inner handler and successful responses carry the remaining quota.
pub async fn enforce(State(gate): State<RouteGate>, req: Request, next: Next) -> Response {
    let client = extract_client_ip(req.headers());
    let now = now_ms();
    let decision = gate.check_at(Some(&client), now);

    if !decision.ok {
        warn!(
            route = %gate.route,
            client = %client,
            limit = decision.limit,
            reset_at = decision.reset_at,
            "Rate limit exceeded"
        );
        return rejection_response(&decision, now);
    }

    let mut response = next.run(req).await;
    if response.status().is_success() {
        render_headers(&decision, now_ms()).apply(response.headers_mut());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::Request as HttpRequest,
        middleware,
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    fn gated_app(gate: RouteGate) -> Router {
        Router::new()
            .route("/api/act/grocery", post(|| async { Json(serde_json::json!({ "results": [] })) }))
            .route("/api/failing", post(|| async { StatusCode::BAD_GATEWAY }))
            .route_layer(middleware::from_fn_with_state(gate, enforce))
    }

    fn request(path: &str, forwarded_for: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("x-forwarded-for", forwarded_for)
            .body(Body::from("{}"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_ninth_request_is_rejected() {
        let limiter = Arc::new(RateLimiter::new());
        let app = gated_app(RouteGate::new("act-grocery", RoutePolicy::per_minute(8), limiter));

        let mut last = None;
        for _ in 0..9 {
            let response = app
                .clone()
                .oneshot(request("/api/act/grocery", "13.13.13.13"))
                .await
                .unwrap();
            last = Some(response);
        }

        let response = last.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "8");
        assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "0");
        assert!(response.headers().get("x-ratelimit-reset").is_some());
        assert!(response.headers().get("retry-after").is_some());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], RATE_LIMITED_MESSAGE);
    }

    #[tokio::test]
    async fn test_admitted_response_carries_quota() {
        let limiter = Arc::new(RateLimiter::new());
        let app = gated_app(RouteGate::new("act-grocery", RoutePolicy::per_minute(8), limiter));

        let response = app
            .oneshot(request("/api/act/grocery", "1.2.3.4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "8");
        assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "7");
        assert_eq!(response.headers().get("x-ratelimit-reset").unwrap(), "60");
        assert!(response.headers().get("retry-after").is_none());
    }

    #[tokio::test]
    async fn test_failed_response_has_no_quota_headers() {
        let limiter = Arc::new(RateLimiter::new());
        let app = gated_app(RouteGate::new("failing", RoutePolicy::per_minute(8), limiter));

        let response = app.oneshot(request("/api/failing", "1.2.3.4")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    #[tokio::test]
    async fn test_clients_are_limited_independently() {
        let limiter = Arc::new(RateLimiter::new());
        let app = gated_app(RouteGate::new("act-grocery", RoutePolicy::per_minute(1), limiter));

        let first = app.clone().oneshot(request("/api/act/grocery", "1.1.1.1")).await.unwrap();
        let repeat = app.clone().oneshot(request("/api/act/grocery", "1.1.1.1")).await.unwrap();
        let other = app.oneshot(request("/api/act/grocery", "2.2.2.2")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_routes_sharing_a_limiter_do_not_share_quota() {
        let limiter = Arc::new(RateLimiter::new());
        let grocery = RouteGate::new("act-grocery", RoutePolicy::per_minute(1), Arc::clone(&limiter));
        let nutrition = RouteGate::new("act-nutrition", RoutePolicy::per_minute(1), Arc::clone(&limiter));

        assert!(grocery.check_at(Some("1.1.1.1"), 0).ok);
        assert!(!grocery.check_at(Some("1.1.1.1"), 1).ok);
        assert!(nutrition.check_at(Some("1.1.1.1"), 2).ok);
        assert_eq!(limiter.bucket_count(), 2);
    }

    #[test]
    fn test_rejection_response() {
        let decision = Decision {
            ok: false,
            remaining: 0,
            limit: 5,
            reset_at: 10_500,
        };

        let response = rejection_response(&decision, 1_000);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "10");
        assert_eq!(response.headers().get("x-ratelimit-reset").unwrap(), "10");
    }
}
