//! Cancellation for navigations, fetchers and deferred values.
//!
//! # Data Flow
//! ```text
//! Router::navigate / fetch / loader returning DeferredData:
//!     → AbortController created per call
//!     → AbortSignal handed to loaders, actions, deferred settle tasks
//!
//! Superseded (newer navigation, same fetcher key, dispose):
//!     → controller.abort()
//!     → signal observers wake; results arriving later are discarded
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative: nothing is forcibly terminated
//! - Abort is idempotent and observable both by polling and by awaiting

pub mod abort;

pub use abort::{AbortController, AbortSignal};
