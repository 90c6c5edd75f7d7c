//! Route patterns, the route tree and ranked matching.
//!
//! # Data Flow
//! ```text
//! Pathname ("/app/todos/42")
//!     → strip basename ("/todos/42")
//!     → router.rs (try ranked branches in order)
//!     → matcher.rs (per segment: prefix match for parents, full match for leaf)
//!     → Return: Vec<RouteMatch> root → leaf, or None
//!
//! Tree Compilation (at router creation):
//!     RouteDefinition[] (route.rs)
//!     → Assign ids, check uniqueness
//!     → Flatten into branches, explode optional segments
//!     → Compile matchers, sort by score
//!     → Freeze as immutable RouteTree
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable for the router's lifetime
//! - No regex in hot path (segment comparison only)
//! - Deterministic: same input always matches same chain
//! - First ranked branch that matches wins

pub mod matcher;
pub mod route;
pub mod router;

pub use matcher::{generate_path, match_path, Matcher, PathError, PathMatch, PathMatcher, PathPattern};
pub use route::{IndexRoute, LayoutRoute, PathRoute, RouteDefinition, RouteHandlers, RouteProps};
pub use router::{
    match_routes, ParamValue, Params, Route, RouteBranch, RouteMatch, RouteTree, RouteTreeError,
};
