//! Route definitions.
//!
//! # Responsibilities
//! - Declare routes as one of three variants: path, index or layout
//! - Attach loaders, actions, revalidation policies and handles
//! - Build a tree from `RouteConfig` data plus a handler registry
//!
//! # Design Decisions
//! - Each variant carries only its legal fields: index routes have no path
//!   and no children, layout routes have no path
//! - Definitions are consumed by `RouteTree::new` and frozen there

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::config::schema::RouteConfig;
use crate::navigation::data::{ActionFn, LoaderFn, ShouldRevalidateFn};

/// Fields shared by every route variant.
#[derive(Clone, Default)]
pub struct RouteProps {
    pub id: Option<String>,
    pub loader: Option<LoaderFn>,
    pub action: Option<ActionFn>,
    /// The route presents errors raised at or below it.
    pub error_boundary: bool,
    pub should_revalidate: Option<ShouldRevalidateFn>,
    /// Opaque application data surfaced alongside matches.
    pub handle: Option<Value>,
}

impl fmt::Debug for RouteProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteProps")
            .field("id", &self.id)
            .field("loader", &self.loader.is_some())
            .field("action", &self.action.is_some())
            .field("error_boundary", &self.error_boundary)
            .field("should_revalidate", &self.should_revalidate.is_some())
            .field("handle", &self.handle)
            .finish()
    }
}

/// A route declaration.
#[derive(Debug, Clone)]
pub enum RouteDefinition {
    Path(PathRoute),
    Index(IndexRoute),
    Layout(LayoutRoute),
}

impl RouteDefinition {
    pub fn props(&self) -> &RouteProps {
        match self {
            RouteDefinition::Path(route) => &route.props,
            RouteDefinition::Index(route) => &route.props,
            RouteDefinition::Layout(route) => &route.props,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            RouteDefinition::Path(route) => Some(&route.path),
            _ => None,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, RouteDefinition::Index(_))
    }

    pub fn case_sensitive(&self) -> bool {
        match self {
            RouteDefinition::Path(route) => route.case_sensitive,
            _ => false,
        }
    }

    pub fn children(&self) -> &[RouteDefinition] {
        match self {
            RouteDefinition::Path(route) => &route.children,
            RouteDefinition::Layout(route) => &route.children,
            RouteDefinition::Index(_) => &[],
        }
    }

    pub(crate) fn into_parts(self) -> (RouteProps, Vec<RouteDefinition>) {
        match self {
            RouteDefinition::Path(route) => (route.props, route.children),
            RouteDefinition::Layout(route) => (route.props, route.children),
            RouteDefinition::Index(route) => (route.props, Vec::new()),
        }
    }
}

/// A route that consumes a path pattern.
#[derive(Debug, Clone)]
pub struct PathRoute {
    pub path: String,
    pub case_sensitive: bool,
    pub props: RouteProps,
    pub children: Vec<RouteDefinition>,
}

impl PathRoute {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            case_sensitive: false,
            props: RouteProps::default(),
            children: Vec::new(),
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn child(mut self, child: impl Into<RouteDefinition>) -> Self {
        self.children.push(child.into());
        self
    }
}

/// The default child of its parent, matched when the parent's path is
/// matched exactly.
#[derive(Debug, Clone, Default)]
pub struct IndexRoute {
    pub props: RouteProps,
}

impl IndexRoute {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A pathless route that only wraps its children.
#[derive(Debug, Clone, Default)]
pub struct LayoutRoute {
    pub props: RouteProps,
    pub children: Vec<RouteDefinition>,
}

impl LayoutRoute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(mut self, child: impl Into<RouteDefinition>) -> Self {
        self.children.push(child.into());
        self
    }
}

macro_rules! route_props_builders {
    ($($route:ty),+) => {$(
        impl $route {
            pub fn id(mut self, id: impl Into<String>) -> Self {
                self.props.id = Some(id.into());
                self
            }

            pub fn loader(mut self, loader: LoaderFn) -> Self {
                self.props.loader = Some(loader);
                self
            }

            pub fn action(mut self, action: ActionFn) -> Self {
                self.props.action = Some(action);
                self
            }

            pub fn error_boundary(mut self) -> Self {
                self.props.error_boundary = true;
                self
            }

            pub fn should_revalidate(mut self, policy: ShouldRevalidateFn) -> Self {
                self.props.should_revalidate = Some(policy);
                self
            }

            pub fn handle(mut self, handle: impl Into<Value>) -> Self {
                self.props.handle = Some(handle.into());
                self
            }
        }
    )+};
}

route_props_builders!(PathRoute, IndexRoute, LayoutRoute);

impl From<PathRoute> for RouteDefinition {
    fn from(route: PathRoute) -> Self {
        RouteDefinition::Path(route)
    }
}

impl From<IndexRoute> for RouteDefinition {
    fn from(route: IndexRoute) -> Self {
        RouteDefinition::Index(route)
    }
}

impl From<LayoutRoute> for RouteDefinition {
    fn from(route: LayoutRoute) -> Self {
        RouteDefinition::Layout(route)
    }
}

/// Loaders, actions and policies for data-declared trees, keyed by route id.
#[derive(Clone, Default)]
pub struct RouteHandlers {
    loaders: HashMap<String, LoaderFn>,
    actions: HashMap<String, ActionFn>,
    policies: HashMap<String, ShouldRevalidateFn>,
}

impl RouteHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loader(mut self, route_id: impl Into<String>, loader: LoaderFn) -> Self {
        self.loaders.insert(route_id.into(), loader);
        self
    }

    pub fn action(mut self, route_id: impl Into<String>, action: ActionFn) -> Self {
        self.actions.insert(route_id.into(), action);
        self
    }

    pub fn should_revalidate(
        mut self,
        route_id: impl Into<String>,
        policy: ShouldRevalidateFn,
    ) -> Self {
        self.policies.insert(route_id.into(), policy);
        self
    }

    fn props_for(&self, id: &str, config: &RouteConfig) -> RouteProps {
        RouteProps {
            id: Some(id.to_string()),
            loader: self.loaders.get(id).cloned(),
            action: self.actions.get(id).cloned(),
            error_boundary: config.error_boundary,
            should_revalidate: self.policies.get(id).cloned(),
            handle: config.handle.clone(),
        }
    }
}

impl fmt::Debug for RouteHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut loaders: Vec<_> = self.loaders.keys().collect();
        let mut actions: Vec<_> = self.actions.keys().collect();
        loaders.sort();
        actions.sort();
        f.debug_struct("RouteHandlers")
            .field("loaders", &loaders)
            .field("actions", &actions)
            .finish()
    }
}

/// Turn route configs into definitions. Ids default to the tree position so
/// handlers can be registered against them either way. Index routes drop
/// any children here; validation reports them.
pub fn definitions_from_config(
    configs: &[RouteConfig],
    handlers: &RouteHandlers,
) -> Vec<RouteDefinition> {
    build_definitions(configs, handlers, "")
}

fn build_definitions(
    configs: &[RouteConfig],
    handlers: &RouteHandlers,
    parent_position: &str,
) -> Vec<RouteDefinition> {
    configs
        .iter()
        .enumerate()
        .map(|(i, config)| {
            let position = tree_position(parent_position, i);
            let id = config.id.clone().unwrap_or_else(|| position.clone());
            let props = handlers.props_for(&id, config);

            if config.index {
                return RouteDefinition::Index(IndexRoute { props });
            }
            let children = build_definitions(&config.children, handlers, &position);
            match &config.path {
                Some(path) => RouteDefinition::Path(PathRoute {
                    path: path.clone(),
                    case_sensitive: config.case_sensitive,
                    props,
                    children,
                }),
                None => RouteDefinition::Layout(LayoutRoute { props, children }),
            }
        })
        .collect()
}

/// Position id of the `index`-th child under `parent` (`"0"`, `"0-1"`, ...).
pub(crate) fn tree_position(parent: &str, index: usize) -> String {
    if parent.is_empty() {
        index.to_string()
    } else {
        format!("{parent}-{index}")
    }
}
