//! Router options, initial history and the route tree in data form.

use serde::{Deserialize, Serialize};

use crate::location::path::normalize_pathname;

/// Root configuration for a router.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Prefix stripped from every pathname before matching ("/" for none).
    pub basename: String,

    /// Redirects followed in a row before giving up.
    pub max_redirects: usize,

    /// Initial history stack.
    pub history: HistoryConfig,

    /// Log filter and metric toggle.
    pub observability: ObservabilityConfig,

    /// Route tree, roots first.
    pub routes: Vec<RouteConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            basename: "/".to_string(),
            max_redirects: 20,
            history: HistoryConfig::default(),
            observability: ObservabilityConfig::default(),
            routes: Vec::new(),
        }
    }
}

impl RouterConfig {
    /// Basename as a router applies it: normalized, `None` for "/".
    pub fn normalized_basename(&self) -> Option<String> {
        let basename = normalize_pathname(&self.basename);
        (basename != "/").then_some(basename)
    }
}

/// Initial history entries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Hrefs of the initial entries (e.g., "/todos?filter=open").
    pub initial_entries: Vec<String>,

    /// Index of the current entry; the last one when absent.
    pub initial_index: Option<usize>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            initial_entries: vec!["/".to_string()],
            initial_index: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset.
    pub log_level: String,

    /// Record router metrics through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

/// A route in data form. Loaders and actions are attached by id when the
/// tree is built.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Unique id; defaults to the tree position ("0", "0-1", ...).
    pub id: Option<String>,

    /// Path pattern; absent for layout and index routes.
    pub path: Option<String>,

    /// Index route (no path, no children).
    pub index: bool,

    /// Compare static segments case-sensitively.
    pub case_sensitive: bool,

    /// Route presents errors raised at or below it.
    pub error_boundary: bool,

    /// Opaque data surfaced alongside matches.
    pub handle: Option<serde_json::Value>,

    pub children: Vec<RouteConfig>,
}
