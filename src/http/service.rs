//! Rate limit decision service.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::ratelimit::{derive_key, extract_client_ip, now_ms, render_headers, PolicyTable, RateLimiter};

use super::middleware::RATE_LIMITED_MESSAGE;

/// Shared state of the decision service.
#[derive(Clone)]
pub struct AppState {
    /// The rate limiter instance
    pub limiter: Arc<RateLimiter>,
    /// Route policies, swapped on reload
    pub policies: Arc<RwLock<PolicyTable>>,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, policies: PolicyTable) -> Self {
        Self {
            limiter,
            policies: Arc::new(RwLock::new(policies)),
        }
    }
}

/// Request body for `POST /v1/check`.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Route name to check
    pub route: String,
    /// Client identifier; the caller's forwarded address when absent
    #[serde(default)]
    pub client: Option<String>,
}

/// Response body for `POST /v1/check`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub ok: bool,
    pub key: String,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request errors of the decision service.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UnknownRoute(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnknownRoute(route) => (
                StatusCode::NOT_FOUND,
                format!("no rate limit policy for route '{}'", route),
            ),
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/check", post(check))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "buckets": state.limiter.bucket_count(),
    }))
}

/// Decide whether a request on a route should be admitted.
#[instrument(skip_all, fields(route = %req.route))]
async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckRequest>,
) -> Result<Response, ApiError> {
    let route = req.route.trim();
    if route.is_empty() {
        warn!("Received check request with empty route");
        return Err(ApiError::BadRequest("route is required".to_string()));
    }

    let policy = state
        .policies
        .read()
        .resolve(route)
        .ok_or_else(|| ApiError::UnknownRoute(route.to_string()))?;

    let client = req.client.unwrap_or_else(|| extract_client_ip(&headers));
    let key = derive_key(Some(&client), route);
    let now = now_ms();
    let decision = state.limiter.check_at(&key, policy.limit, policy.window_ms, now);

    debug!(key = %key, ok = decision.ok, remaining = decision.remaining, "Rate limit decision made");

    let rendered = render_headers(&decision, now);
    let body = CheckResponse {
        ok: decision.ok,
        key,
        limit: decision.limit,
        remaining: decision.remaining,
        reset_at: decision.reset_at,
        error: (!decision.ok).then(|| RATE_LIMITED_MESSAGE.to_string()),
    };

    let mut response = if decision.ok {
        (StatusCode::OK, Json(body)).into_response()
    } else {
        warn!(key = %body.key, limit = decision.limit, "Rate limit exceeded");
        (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
    };

    if decision.ok {
        rendered.apply(response.headers_mut());
    } else {
        rendered.apply_with_retry_after(response.headers_mut());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::RoutePolicy;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut policies = PolicyTable::new();
        policies.insert("act-grocery", RoutePolicy::per_minute(2));
        AppState::new(Arc::new(RateLimiter::new()), policies)
    }

    fn check_request(body: serde_json::Value, forwarded_for: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/v1/check")
            .header("content-type", "application/json");
        if let Some(ip) = forwarded_for {
            builder = builder.header("x-forwarded-for", ip);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_check_admits_then_rejects() {
        let app = router(test_state());
        let body = serde_json::json!({ "route": "act-grocery" });

        let first = app.clone().oneshot(check_request(body.clone(), Some("9.9.9.9"))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get("x-ratelimit-remaining").unwrap(), "1");
        let json = body_json(first).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["key"], "act-grocery:9.9.9.9");
        assert!(json.get("error").is_none());

        app.clone().oneshot(check_request(body.clone(), Some("9.9.9.9"))).await.unwrap();
        let third = app.oneshot(check_request(body, Some("9.9.9.9"))).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(third.headers().get("retry-after").is_some());
        let json = body_json(third).await;
        assert_eq!(json["ok"], false);
        assert_eq!(json["remaining"], 0);
        assert_eq!(json["error"], RATE_LIMITED_MESSAGE);
    }

    #[tokio::test]
    async fn test_explicit_client_overrides_headers() {
        let app = router(test_state());
        let body = serde_json::json!({ "route": "act-grocery", "client": "user-1" });

        let response = app.oneshot(check_request(body, Some("9.9.9.9"))).await.unwrap();
        assert_eq!(body_json(response).await["key"], "act-grocery:user-1");
    }

    #[tokio::test]
    async fn test_missing_client_is_unknown() {
        let app = router(test_state());
        let body = serde_json::json!({ "route": "act-grocery" });

        let response = app.oneshot(check_request(body, None)).await.unwrap();
        assert_eq!(body_json(response).await["key"], "act-grocery:unknown");
    }

    #[tokio::test]
    async fn test_empty_route_rejected() {
        let app = router(test_state());
        let response = app
            .oneshot(check_request(serde_json::json!({ "route": "  " }), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route_rejected() {
        let app = router(test_state());
        let response = app
            .oneshot(check_request(serde_json::json!({ "route": "nope" }), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_default_policy_applies_to_unknown_route() {
        let state = test_state();
        state.policies.write().default = Some(RoutePolicy::per_minute(3));
        let app = router(state);

        let response = app
            .oneshot(check_request(serde_json::json!({ "route": "nope" }), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "3");
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state();
        state.limiter.check("act-grocery:1.1.1.1", 2, 60_000);
        let app = router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["buckets"], 1);
    }
}
