//! Logging setup and router metrics.
//!
//! # Data Flow
//! ```text
//! routing / navigation / fetcher / deferred produce:
//!     → tracing events (structured fields: navigation_id, route_id, fetcher_key)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (binary only)
//!     → whatever metrics recorder the application installs
//! ```
//!
//! # Design Decisions
//! - Structured fields, never interpolated messages
//! - Metrics are cheap (facade calls, no-ops without a recorder)

pub mod logging;
pub mod metrics;
