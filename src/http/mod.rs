//! HTTP surface: the route gating middleware and the decision service.

mod middleware;
mod server;
mod service;

pub use middleware::{enforce, rejection_response, RouteGate, RATE_LIMITED_MESSAGE};
pub use server::HttpServer;
pub use service::{router, ApiError, AppState, CheckRequest, CheckResponse};
