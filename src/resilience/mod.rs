//! Deadlines for loaders and actions.
//!
//! # Data Flow
//! ```text
//! Route declaration:
//!     loader_fn(...) → timeouts.rs with_timeout(loader, deadline)
//!     → router calls the wrapped loader like any other
//!     → On deadline: Err(504 ErrorResponse) → nearest boundary
//! ```
//!
//! # Design Decisions
//! - Deadlines are opt-in wrappers, composed where routes are declared
//! - Timeout errors are ordinary route errors

pub mod timeouts;

pub use timeouts::with_timeout;
