//! Routeguard - per-client fixed-window rate limiting for HTTP routes
//!
//! This crate implements the rate limiter that guards an application's API
//! routes: each (route, client) pair gets its own fixed-window counter, and
//! rejected requests are answered with 429 and standard `X-RateLimit-*`
//! headers. It ships an axum middleware for gating routes in-process and a
//! small HTTP decision service.

pub mod config;
pub mod error;
pub mod http;
pub mod maintenance;
pub mod ratelimit;
