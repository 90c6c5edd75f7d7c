//! Client-side data router library.
//!
//! Matches locations against a nested route tree, runs loaders and actions
//! around each navigation, and publishes one observable state snapshot per
//! commit.

pub mod config;
pub mod deferred;
pub mod fetcher;
pub mod lifecycle;
pub mod location;
pub mod navigation;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod subscription;

pub use config::schema::RouterConfig;
pub use deferred::{DeferredData, DeferredError, TrackedValue};
pub use fetcher::Fetcher;
pub use location::{FormData, Location, MemoryHistory, Path};
pub use navigation::{
    NavigateOptions, NavigationOutcome, Router, RouterError, RouterOptions, RouterState,
};
pub use routing::{IndexRoute, LayoutRoute, PathRoute, RouteTree};
