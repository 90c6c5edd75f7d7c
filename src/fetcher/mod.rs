//! Fetcher subsystem.
//!
//! # Data Flow
//! ```text
//! Router::fetch(key, href, submission?)
//!     → registry.rs start(key) (abort previous call under key)
//!     → match href, pick target route
//!     → fetchers[key] = Submitting / Loading
//!     → action or loader
//!     → ticket still current? else drop result
//!     → submission ok: fetchers[key] = Loading(data), revalidate main state
//!     → fetchers[key] = Idle(data) or Idle(error, boundary)
//!
//! FetcherHandle dropped / delete_fetcher(key):
//!     → abort in-flight call, remove fetchers[key]
//! ```
//!
//! # Design Decisions
//! - Fetchers only ever write their own slice of router state
//! - A submission refreshes shared data through revalidation, never by
//!   writing loader data directly

pub mod registry;

pub use registry::{Fetcher, FetcherRegistry, FetcherTicket};
