//! Error boundary lookup and not-found matches.

use crate::location::path::has_index_param;
use crate::routing::{Params, RouteMatch, RouteTree};

/// Route id used when no root route can present a not-found error.
pub const NOT_FOUND_ROUTE_ID: &str = "__not_found__";

/// Route that presents an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub route_id: String,
    /// False when no route in the chain declares a boundary and the error
    /// falls back to the root match.
    pub declared: bool,
}

/// Walk upward from `route_id` (inclusive) to the closest route declaring
/// an error boundary. Without `route_id` the walk starts at the leaf.
pub fn find_nearest_boundary(
    tree: &RouteTree,
    matches: &[RouteMatch],
    route_id: Option<&str>,
) -> Option<Boundary> {
    let end = match route_id {
        Some(id) => matches.iter().position(|m| m.route_id == id)? + 1,
        None => matches.len(),
    };

    let declared = matches[..end].iter().rev().find(|m| {
        tree.route(&m.route_id)
            .is_some_and(|route| route.error_boundary)
    });

    match declared {
        Some(m) => Some(Boundary {
            route_id: m.route_id.clone(),
            declared: true,
        }),
        None => matches.first().map(|m| Boundary {
            route_id: m.route_id.clone(),
            declared: false,
        }),
    }
}

/// Matches above `boundary_id`, used to keep loading ancestors of a failed
/// action.
pub fn matches_until(matches: &[RouteMatch], boundary_id: &str) -> Vec<RouteMatch> {
    match matches.iter().position(|m| m.route_id == boundary_id) {
        Some(index) => matches[..index].to_vec(),
        None => matches.to_vec(),
    }
}

/// Chain shown for an unmatched location: the root layout route (pathless,
/// index or `/`), or a synthetic route when there is none.
pub fn not_found_matches(tree: &RouteTree) -> Vec<RouteMatch> {
    let route_id = tree
        .roots()
        .find(|route| {
            route.index || route.path.as_deref().map_or(true, |p| p.is_empty() || p == "/")
        })
        .map(|route| route.id.clone())
        .unwrap_or_else(|| NOT_FOUND_ROUTE_ID.to_string());

    vec![RouteMatch {
        route_id,
        params: Params::default(),
        pathname: "/".to_string(),
        pathname_base: "/".to_string(),
        remaining: String::new(),
    }]
}

/// The match that handles a submission: the leaf, except an index leaf
/// without `?index` in the search defers to its parent.
pub fn target_match<'a>(
    tree: &RouteTree,
    matches: &'a [RouteMatch],
    search: &str,
) -> Option<&'a RouteMatch> {
    let leaf = matches.last()?;
    let is_index = tree.route(&leaf.route_id).is_some_and(|r| r.index);
    if is_index && !has_index_param(search) && matches.len() > 1 {
        matches.get(matches.len() - 2)
    } else {
        Some(leaf)
    }
}
