//! Route policy configuration and lookup.
//!
//! Every gated route has its own limit and window. Policies come either from
//! the built-in table of application routes or from a YAML file:
//!
//! ```yaml
//! default:
//!   limit: 30
//! routes:
//!   act-grocery:
//!     limit: 8
//!     window_ms: 60000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{Result, RouteguardError};

/// Window used when a policy does not name one.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Limit and window applied to one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePolicy {
    /// Maximum admitted requests per window
    pub limit: u64,
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

impl RoutePolicy {
    /// A policy of `limit` requests per minute.
    pub const fn per_minute(limit: u64) -> Self {
        Self {
            limit,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }

    fn validate(&self, route: &str) -> Result<()> {
        if self.limit == 0 {
            return Err(RouteguardError::Policy {
                route: route.to_string(),
                reason: "limit must be greater than zero".to_string(),
            });
        }
        if self.window_ms == 0 {
            return Err(RouteguardError::Policy {
                route: route.to_string(),
                reason: "window_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-route requests-per-minute limits of the application's API.
const BUILTIN_ROUTES: &[(&str, u64)] = &[
    ("act-grocery", 8),
    ("act-nutrition", 12),
    ("analyze-receipt", 10),
    ("auth-demo", 10),
    ("auth-register", 5),
    ("cooking-import", 10),
    ("cooking-webhook", 30),
    ("data-sync", 10),
    ("embeddings", 15),
    ("exercise-search", 30),
    ("group-create", 5),
    ("group-delete", 5),
    ("group-detail", 30),
    ("group-discover", 20),
    ("group-join", 10),
    ("group-join-code", 10),
    ("group-leave", 10),
    ("group-list", 20),
    ("group-messages-post", 20),
    ("group-messages-read", 30),
    ("group-msg-delete", 10),
    ("group-progress", 20),
    ("group-update", 10),
    ("images-after", 5),
    ("images-generate", 20),
    ("meals-analyze-photo", 20),
    ("meals-generate-plan", 10),
    ("meals-lookup-web", 20),
    ("meals-suggest", 15),
    ("onboarding-voice", 10),
    ("parse-recipe-url", 15),
    ("plans-adjust", 10),
    ("plans-generate", 20),
    ("public-profile", 30),
    ("push-subscribe-expo", 5),
    ("research", 10),
    ("rico", 20),
    ("scale-entry", 30),
    ("social-settings", 20),
    ("social-settings-update", 10),
    ("username-check", 30),
    ("video-generate", 10),
    ("voice-parse", 15),
    ("voice-sonic", 30),
    ("voice-sonic-stream", 30),
    ("weekly-review", 5),
];

/// Policies for every gated route, plus an optional fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    /// Policy for routes not listed in `routes`
    #[serde(default)]
    pub default: Option<RoutePolicy>,
    /// Map of route name to policy
    #[serde(default)]
    pub routes: HashMap<String, RoutePolicy>,
}

impl PolicyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The application's route table.
    pub fn builtin() -> Self {
        let routes = BUILTIN_ROUTES
            .iter()
            .map(|(route, limit)| (route.to_string(), RoutePolicy::per_minute(*limit)))
            .collect();

        Self {
            default: None,
            routes,
        }
    }

    /// Load policies from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading route policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load policies from a YAML string, validating every entry.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let table: PolicyTable = serde_yaml::from_str(yaml)
            .map_err(|e| RouteguardError::Config(format!("Failed to parse route policies: {}", e)))?;
        table.validate()?;
        Ok(table)
    }

    /// Check that every policy has a positive limit and window.
    pub fn validate(&self) -> Result<()> {
        if let Some(default) = &self.default {
            default.validate("default")?;
        }
        for (route, policy) in &self.routes {
            policy.validate(route)?;
        }
        Ok(())
    }

    /// Add or replace the policy for a route.
    pub fn insert(&mut self, route: impl Into<String>, policy: RoutePolicy) {
        self.routes.insert(route.into(), policy);
    }

    /// Find the policy for a route, falling back to the default.
    pub fn resolve(&self, route: &str) -> Option<RoutePolicy> {
        self.routes.get(route).copied().or(self.default)
    }

    /// Number of explicitly configured routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is explicitly configured.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
