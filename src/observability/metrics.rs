//! Router metrics.
//!
//! # Responsibilities
//! - Define router metrics (navigations, loader latency, errors, fetchers)
//! - Record them through the `metrics` facade
//!
//! # Metrics
//! - `router_navigations_total` (counter): transitions by outcome
//!   (committed, superseded, redirected, not_found)
//! - `router_loader_duration_seconds` (histogram): loader/action latency by route
//! - `router_route_errors_total` (counter): errors stored at a boundary by kind
//! - `router_fetchers_total` (counter): fetcher calls by kind and outcome
//! - `router_deferred_settled_total` (counter): deferred entries by outcome
//!
//! # Design Decisions
//! - No exporter here; the embedding application installs a recorder
//! - Recording can be switched off globally (`metrics_enabled = false`)

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Switch recording on or off for the whole process.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn record_navigation(outcome: &'static str) {
    if is_enabled() {
        metrics::counter!("router_navigations_total", "outcome" => outcome).increment(1);
    }
}

pub fn record_loader(route_id: &str, start: Instant) {
    if is_enabled() {
        metrics::histogram!("router_loader_duration_seconds", "route" => route_id.to_string())
            .record(start.elapsed().as_secs_f64());
    }
}

pub fn record_route_error(kind: &'static str) {
    if is_enabled() {
        metrics::counter!("router_route_errors_total", "kind" => kind).increment(1);
    }
}

pub fn record_fetcher(kind: &'static str, outcome: &'static str) {
    if is_enabled() {
        metrics::counter!("router_fetchers_total", "kind" => kind, "outcome" => outcome)
            .increment(1);
    }
}

pub fn record_deferred_settled(outcome: &'static str) {
    if is_enabled() {
        metrics::counter!("router_deferred_settled_total", "outcome" => outcome).increment(1);
    }
}
