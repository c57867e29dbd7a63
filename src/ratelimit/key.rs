//! Bucket key derivation and client identification.

use axum::http::HeaderMap;

/// Identifier shared by every client that cannot be identified.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Proxy chain header; the first hop is the originating client.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Single-address header set by some reverse proxies.
pub const REAL_IP: &str = "x-real-ip";

/// A key that identifies one (route, client) bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Route name namespacing the bucket
    pub route: String,
    /// Normalized client identifier
    pub client: String,
}

impl BucketKey {
    /// Create a key, normalizing blank or missing client identifiers to `"unknown"`.
    pub fn new(client: Option<&str>, route: &str) -> Self {
        let client = client
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNKNOWN_CLIENT);

        Self {
            route: route.to_string(),
            client: client.to_string(),
        }
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.route, self.client)
    }
}

/// Derive the bucket key string `"{route}:{client}"`.
pub fn derive_key(client: Option<&str>, route: &str) -> String {
    BucketKey::new(client, route).to_string()
}

/// Resolve the client address from forwarding headers.
///
/// Takes the first hop of `X-Forwarded-For`, falls back to `X-Real-IP`,
/// and returns `"unknown"` when neither yields a non-blank value.
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    let forwarded = header_str(headers, FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    let real_ip = || {
        header_str(headers, REAL_IP)
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
