//! Route tree compilation and matching.
//!
//! # Responsibilities
//! - Freeze route definitions into an id-addressable tree
//! - Flatten the tree into branches (root to leaf), compile and rank them
//! - Match a pathname to the best branch and return its chain of matches
//!
//! # Design Decisions
//! - Immutable after construction (shared without locks)
//! - Patterns compiled once per branch; parents match as prefixes, the
//!   leaf must consume the whole pathname
//! - Ranking is a stable sort by score, so equal scores keep declaration
//!   order; siblings with equal scores compare by child index
//! - Explicit `None` when nothing matches; a not-found is not an error here

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::config::schema::RouteConfig;
use crate::location::path::{join_paths, normalize_pathname, strip_basename};
use crate::navigation::data::{ActionFn, LoaderFn, ShouldRevalidateFn};
use crate::routing::matcher::{
    compute_score, explode_optional_segments, Matcher, PathError, PathPattern,
};
use crate::routing::route::{
    definitions_from_config, tree_position, RouteDefinition, RouteHandlers,
};

/// Errors raised while building a route tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteTreeError {
    #[error("duplicate route id {id:?}")]
    DuplicateId { id: String },

    #[error("route {route_id:?} has an invalid path: {source}")]
    InvalidPath {
        route_id: String,
        #[source]
        source: PathError,
    },

    #[error("absolute path {path:?} of route {route_id:?} is not nested under its parent path {parent:?}")]
    AbsoluteChildPath {
        route_id: String,
        path: String,
        parent: String,
    },
}

/// A frozen route.
#[derive(Clone)]
pub struct Route {
    pub id: String,
    pub path: Option<String>,
    pub index: bool,
    pub case_sensitive: bool,
    pub loader: Option<LoaderFn>,
    pub action: Option<ActionFn>,
    pub error_boundary: bool,
    pub should_revalidate: Option<ShouldRevalidateFn>,
    pub handle: Option<serde_json::Value>,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("index", &self.index)
            .field("loader", &self.loader.is_some())
            .field("action", &self.action.is_some())
            .field("error_boundary", &self.error_boundary)
            .field("children", &self.children)
            .finish()
    }
}

/// A bound route param. A name bound by more than one route in the chain
/// collects every value, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

impl ParamValue {
    /// Innermost value.
    pub fn last(&self) -> &str {
        match self {
            ParamValue::One(value) => value,
            ParamValue::Many(values) => values.last().map(String::as_str).unwrap_or_default(),
        }
    }
}

/// Params of a match chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    /// Bind `name`; an existing binding becomes a sequence.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        match self.0.entry(name.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(ParamValue::One(value));
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => {
                let merged = match slot.get_mut() {
                    ParamValue::One(first) => vec![std::mem::take(first), value],
                    ParamValue::Many(values) => {
                        let mut values = std::mem::take(values);
                        values.push(value);
                        values
                    }
                };
                slot.insert(ParamValue::Many(merged));
            }
        }
    }

    /// Innermost value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(ParamValue::last)
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        match self.0.get(name) {
            Some(ParamValue::One(value)) => vec![value.as_str()],
            Some(ParamValue::Many(values)) => values.iter().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    pub fn raw(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten to innermost values, e.g. for `generate_path`.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.last().to_string()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::default();
        for (k, v) in iter {
            params.bind(k, v);
        }
        params
    }
}

/// One route of a matched chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    pub route_id: String,
    /// Params of the whole chain.
    pub params: Params,
    /// Pathname consumed up to and including this route.
    pub pathname: String,
    /// `pathname` without a splat remainder; children resolve against it.
    pub pathname_base: String,
    /// Pathname left for the routes below this one.
    pub remaining: String,
}

/// One segment of a flattened branch.
#[derive(Debug, Clone)]
pub struct BranchSegment {
    pub route_id: String,
    /// Pattern relative to the parent's matched pathname.
    pub relative_path: String,
    pub child_index: usize,
    pattern: PathPattern,
}

/// A root-to-leaf path through the tree.
#[derive(Debug, Clone)]
pub struct RouteBranch {
    /// Joined pattern of the whole branch.
    pub path: String,
    pub score: i32,
    pub segments: Vec<BranchSegment>,
}

impl RouteBranch {
    fn match_pathname(&self, pathname: &str) -> Option<Vec<RouteMatch>> {
        let mut matched_pathname = String::from("/");
        let mut matches: Vec<RouteMatch> = Vec::with_capacity(self.segments.len());
        let mut params = Params::default();

        for segment in &self.segments {
            let remaining = if matched_pathname == "/" {
                pathname
            } else {
                pathname.get(matched_pathname.len()..).unwrap_or_default()
            };
            let remaining = if remaining.is_empty() { "/" } else { remaining };

            let found = segment.pattern.match_path(remaining)?;
            for (name, value) in found.params {
                params.bind(name, value);
            }

            let full = join_paths([matched_pathname.as_str(), found.pathname.as_str()]);
            let base = normalize_pathname(&join_paths([
                matched_pathname.as_str(),
                found.pathname_base.as_str(),
            ]));
            matches.push(RouteMatch {
                route_id: segment.route_id.clone(),
                params: Params::default(),
                remaining: rest_of(pathname, &full),
                pathname: normalize_pathname(&full),
                pathname_base: base,
            });

            if found.pathname_base != "/" {
                matched_pathname = join_paths([matched_pathname.as_str(), found.pathname_base.as_str()]);
            }
        }

        for m in &mut matches {
            m.params = params.clone();
        }
        Some(matches)
    }
}

fn rest_of(pathname: &str, consumed: &str) -> String {
    let consumed = consumed.trim_end_matches('/');
    pathname
        .get(consumed.len()..)
        .unwrap_or_default()
        .trim_end_matches('/')
        .to_string()
}

/// An immutable, ranked route tree.
#[derive(Debug, Clone)]
pub struct RouteTree {
    routes: HashMap<String, Route>,
    roots: Vec<String>,
    branches: Vec<RouteBranch>,
}

struct FlattenFrame<'a> {
    parent_path: &'a str,
    parent_segments: &'a [SegmentMeta],
}

#[derive(Clone)]
struct SegmentMeta {
    route_id: String,
    relative_path: String,
    case_sensitive: bool,
    child_index: usize,
}

impl RouteTree {
    pub fn new(definitions: Vec<RouteDefinition>) -> Result<Self, RouteTreeError> {
        let mut routes = HashMap::new();
        let roots = freeze(definitions, None, "", &mut routes)?;

        let mut branches = Vec::new();
        flatten(
            &roots,
            &routes,
            FlattenFrame {
                parent_path: "",
                parent_segments: &[],
            },
            &mut branches,
        )?;
        rank_branches(&mut branches);

        tracing::debug!(
            routes = routes.len(),
            branches = branches.len(),
            "Route tree compiled"
        );
        Ok(Self {
            routes,
            roots,
            branches,
        })
    }

    /// Build from route configs, attaching handlers by route id.
    pub fn from_config(
        configs: &[RouteConfig],
        handlers: &RouteHandlers,
    ) -> Result<Self, RouteTreeError> {
        Self::new(definitions_from_config(configs, handlers))
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Route> {
        self.roots.iter().filter_map(|id| self.routes.get(id))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Flattened branches in rank order.
    pub fn branches(&self) -> &[RouteBranch] {
        &self.branches
    }

    /// Match `pathname` (after stripping `basename`) to the best branch.
    pub fn match_routes(&self, pathname: &str, basename: Option<&str>) -> Option<Vec<RouteMatch>> {
        let pathname = match basename {
            Some(basename) => strip_basename(pathname, basename)?,
            None => pathname.to_string(),
        };
        let pathname = normalize_pathname(&join_paths([pathname.as_str()]));

        self.branches
            .iter()
            .find_map(|branch| branch.match_pathname(&pathname))
    }
}

/// Match `pathname` against `tree`.
pub fn match_routes(tree: &RouteTree, pathname: &str, basename: Option<&str>) -> Option<Vec<RouteMatch>> {
    tree.match_routes(pathname, basename)
}

fn freeze(
    definitions: Vec<RouteDefinition>,
    parent: Option<&str>,
    parent_position: &str,
    routes: &mut HashMap<String, Route>,
) -> Result<Vec<String>, RouteTreeError> {
    let mut ids = Vec::with_capacity(definitions.len());
    for (i, definition) in definitions.into_iter().enumerate() {
        let position = tree_position(parent_position, i);
        let path = definition.path().map(str::to_string);
        let index = definition.is_index();
        let case_sensitive = definition.case_sensitive();
        let (props, children) = definition.into_parts();
        let id = props.id.clone().unwrap_or_else(|| position.clone());

        if routes.contains_key(&id) {
            return Err(RouteTreeError::DuplicateId { id });
        }
        routes.insert(
            id.clone(),
            Route {
                id: id.clone(),
                path,
                index,
                case_sensitive,
                loader: props.loader,
                action: props.action,
                error_boundary: props.error_boundary,
                should_revalidate: props.should_revalidate,
                handle: props.handle,
                parent: parent.map(str::to_string),
                children: Vec::new(),
            },
        );

        let child_ids = freeze(children, Some(&id), &position, routes)?;
        if let Some(route) = routes.get_mut(&id) {
            route.children = child_ids;
        }
        ids.push(id);
    }
    Ok(ids)
}

fn flatten(
    ids: &[String],
    routes: &HashMap<String, Route>,
    frame: FlattenFrame<'_>,
    branches: &mut Vec<RouteBranch>,
) -> Result<(), RouteTreeError> {
    for (child_index, id) in ids.iter().enumerate() {
        let Some(route) = routes.get(id) else {
            continue;
        };
        let declared = route.path.as_deref().unwrap_or_default();
        let alternatives = if declared.is_empty() {
            vec![String::new()]
        } else {
            explode_optional_segments(declared)
        };

        for alternative in alternatives {
            let relative = if alternative.starts_with('/') {
                let Some(stripped) = alternative.strip_prefix(frame.parent_path) else {
                    return Err(RouteTreeError::AbsoluteChildPath {
                        route_id: route.id.clone(),
                        path: alternative,
                        parent: frame.parent_path.to_string(),
                    });
                };
                stripped.to_string()
            } else {
                alternative
            };

            let path = join_paths([frame.parent_path, relative.as_str()]);
            let mut segments = frame.parent_segments.to_vec();
            segments.push(SegmentMeta {
                route_id: route.id.clone(),
                relative_path: relative,
                case_sensitive: route.case_sensitive,
                child_index,
            });

            if !route.children.is_empty() {
                flatten(
                    &route.children,
                    routes,
                    FlattenFrame {
                        parent_path: &path,
                        parent_segments: &segments,
                    },
                    branches,
                )?;
            }

            // layout routes only contribute to their children's branches
            if route.path.is_none() && !route.index {
                continue;
            }
            branches.push(compile_branch(path, route.index, &segments)?);
        }
    }
    Ok(())
}

fn compile_branch(
    path: String,
    index: bool,
    segments: &[SegmentMeta],
) -> Result<RouteBranch, RouteTreeError> {
    let last = segments.len().saturating_sub(1);
    let compiled = segments
        .iter()
        .enumerate()
        .map(|(i, meta)| {
            let pattern = PathPattern::compile(&meta.relative_path, meta.case_sensitive, i == last)
                .map_err(|source| RouteTreeError::InvalidPath {
                    route_id: meta.route_id.clone(),
                    source,
                })?;
            Ok(BranchSegment {
                route_id: meta.route_id.clone(),
                relative_path: meta.relative_path.clone(),
                child_index: meta.child_index,
                pattern,
            })
        })
        .collect::<Result<Vec<_>, RouteTreeError>>()?;

    Ok(RouteBranch {
        score: compute_score(&path, index),
        path,
        segments: compiled,
    })
}

fn rank_branches(branches: &mut [RouteBranch]) {
    branches.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            compare_sibling_indexes(
                &a.segments.iter().map(|s| s.child_index).collect::<Vec<_>>(),
                &b.segments.iter().map(|s| s.child_index).collect::<Vec<_>>(),
            )
        })
    });
}

/// Branches that differ only in their last child index rank by that index;
/// anything else keeps its flattened order.
fn compare_sibling_indexes(a: &[usize], b: &[usize]) -> std::cmp::Ordering {
    let siblings = a.len() == b.len() && !a.is_empty() && a[..a.len() - 1] == b[..b.len() - 1];
    if siblings {
        a[a.len() - 1].cmp(&b[b.len() - 1])
    } else {
        std::cmp::Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::route::{IndexRoute, LayoutRoute, PathRoute};

    fn todos_tree() -> RouteTree {
        RouteTree::new(vec![PathRoute::new("/")
            .id("root")
            .child(IndexRoute::new().id("home"))
            .child(
                PathRoute::new("todos")
                    .id("todos")
                    .child(PathRoute::new(":id").id("todo"))
                    .child(PathRoute::new("junk").id("junk")),
            )
            .child(PathRoute::new("*").id("catch-all"))
            .into()])
        .unwrap()
    }

    fn ids(matches: &[RouteMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.route_id.as_str()).collect()
    }

    #[test]
    fn test_nested_match_chain() {
        let tree = todos_tree();
        let matches = tree.match_routes("/todos/42", None).unwrap();
        assert_eq!(ids(&matches), vec!["root", "todos", "todo"]);
        assert_eq!(matches[2].params.get("id"), Some("42"));
        assert_eq!(matches[0].params, matches[2].params);
        assert_eq!(matches[1].pathname, "/todos");
        assert_eq!(matches[1].remaining, "/42");
        assert_eq!(matches[2].pathname, "/todos/42");
        assert_eq!(matches[2].remaining, "");
    }

    #[test]
    fn test_static_beats_dynamic() {
        let tree = todos_tree();
        let matches = tree.match_routes("/todos/junk", None).unwrap();
        assert_eq!(ids(&matches), vec!["root", "todos", "junk"]);
    }

    #[test]
    fn test_index_and_splat() {
        let tree = todos_tree();
        assert_eq!(ids(&tree.match_routes("/", None).unwrap()), vec!["root", "home"]);

        let matches = tree.match_routes("/nope/deeper", None).unwrap();
        assert_eq!(ids(&matches), vec!["root", "catch-all"]);
        assert_eq!(matches[1].params.get("*"), Some("nope/deeper"));
    }

    #[test]
    fn test_no_match_is_none() {
        let tree = RouteTree::new(vec![PathRoute::new("/a").into()]).unwrap();
        assert!(tree.match_routes("/b", None).is_none());
        assert!(tree.match_routes("/a/b", None).is_none());
    }

    #[test]
    fn test_basename() {
        let tree = todos_tree();
        let matches = tree.match_routes("/APP/todos/1", Some("/app")).unwrap();
        assert_eq!(ids(&matches), vec!["root", "todos", "todo"]);
        assert!(tree.match_routes("/other/todos", Some("/app")).is_none());
    }

    #[test]
    fn test_matching_is_deterministic() {
        let tree = todos_tree();
        let first = tree.match_routes("/todos/7", None);
        for _ in 0..10 {
            assert_eq!(tree.match_routes("/todos/7", None), first);
        }
    }

    #[test]
    fn test_equal_scores_follow_declaration_order() {
        let tree = RouteTree::new(vec![
            PathRoute::new("/:a").id("first").into(),
            PathRoute::new("/:b").id("second").into(),
        ])
        .unwrap();
        let matches = tree.match_routes("/x", None).unwrap();
        assert_eq!(ids(&matches), vec!["first"]);
    }

    #[test]
    fn test_layout_routes_and_positional_ids() {
        let tree = RouteTree::new(vec![LayoutRoute::new()
            .child(PathRoute::new("/about"))
            .into()])
        .unwrap();
        let matches = tree.match_routes("/about", None).unwrap();
        assert_eq!(ids(&matches), vec!["0", "0-0"]);
        assert_eq!(tree.route("0-0").unwrap().parent.as_deref(), Some("0"));
        assert_eq!(tree.branches().len(), 1);
    }

    #[test]
    fn test_repeated_param_becomes_sequence() {
        let tree = RouteTree::new(vec![PathRoute::new("/:id")
            .child(PathRoute::new(":id"))
            .into()])
        .unwrap();
        let matches = tree.match_routes("/a/b", None).unwrap();
        let params = &matches[1].params;
        assert_eq!(params.get("id"), Some("b"));
        assert_eq!(params.get_all("id"), vec!["a", "b"]);
        assert_eq!(
            serde_json::to_value(params).unwrap(),
            serde_json::json!({ "id": ["a", "b"] })
        );
    }

    #[test]
    fn test_optional_segments_in_tree() {
        let tree = RouteTree::new(vec![PathRoute::new("/:lang?/about").id("about").into()]).unwrap();
        assert_eq!(
            tree.match_routes("/en/about", None).unwrap()[0].params.get("lang"),
            Some("en")
        );
        assert!(tree.match_routes("/about", None).unwrap()[0].params.is_empty());
    }

    #[test]
    fn test_construction_errors() {
        let duplicate = RouteTree::new(vec![
            PathRoute::new("/a").id("x").into(),
            PathRoute::new("/b").id("x").into(),
        ]);
        assert_eq!(
            duplicate.unwrap_err(),
            RouteTreeError::DuplicateId { id: "x".into() }
        );

        let absolute = RouteTree::new(vec![PathRoute::new("/a")
            .child(PathRoute::new("/b").id("b"))
            .into()]);
        assert!(matches!(absolute, Err(RouteTreeError::AbsoluteChildPath { .. })));

        let invalid = RouteTree::new(vec![PathRoute::new("/:x/:x").into()]);
        assert!(matches!(invalid, Err(RouteTreeError::InvalidPath { .. })));
    }

    #[test]
    fn test_absolute_child_path_under_parent() {
        let tree = RouteTree::new(vec![PathRoute::new("/a")
            .id("a")
            .child(PathRoute::new("/a/b").id("b"))
            .into()])
        .unwrap();
        assert_eq!(ids(&tree.match_routes("/a/b", None).unwrap()), vec!["a", "b"]);
    }
}
