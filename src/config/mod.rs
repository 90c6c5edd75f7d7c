//! Route tables and router options read from TOML.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (toml into RouterConfig)
//!     → validation.rs (ids, index routes, patterns, history bounds)
//!     → RouterConfig (validated, immutable)
//!     → RouteTree::from_config + RouteHandlers (loaders attached by id)
//!     → RouterOptions::from_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a router is built from it once
//! - Every field has a default; an empty file is a router with no routes
//! - Handlers never live in config, only route ids that code binds to

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{HistoryConfig, ObservabilityConfig, RouteConfig, RouterConfig};
pub use validation::{validate_config, ValidationError};
