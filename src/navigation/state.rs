//! Canonical router state.
//!
//! A [`RouterState`] is never mutated once published: every commit builds
//! a new one and swaps it in whole.

use std::collections::BTreeMap;

use hyper::Method;
use serde_json::Value;

use crate::deferred::DeferredData;
use crate::fetcher::Fetcher;
use crate::location::{FormData, HistoryAction, Location};
use crate::navigation::error::RouteError;
use crate::routing::{Params, RouteMatch};

/// Loader output stored per route.
#[derive(Debug, Clone)]
pub enum LoaderValue {
    Data(Value),
    Deferred(DeferredData),
}

impl LoaderValue {
    /// Plain data, if this is not a deferred container.
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            LoaderValue::Data(value) => Some(value),
            LoaderValue::Deferred(_) => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&DeferredData> {
        match self {
            LoaderValue::Deferred(data) => Some(data),
            LoaderValue::Data(_) => None,
        }
    }
}

impl PartialEq for LoaderValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LoaderValue::Data(a), LoaderValue::Data(b)) => a == b,
            (LoaderValue::Deferred(a), LoaderValue::Deferred(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Coarse status shared by navigations and fetchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionStatus {
    Idle,
    Loading,
    Submitting,
}

/// The in-flight main navigation, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Navigation {
    #[default]
    Idle,
    /// Running loaders. Carries the form fields when loading after an action
    /// or for a GET submission.
    Loading {
        location: Location,
        form_method: Option<Method>,
        form_data: Option<FormData>,
    },
    /// Running an action.
    Submitting {
        location: Location,
        form_method: Method,
        form_data: FormData,
    },
}

impl Navigation {
    pub fn status(&self) -> TransitionStatus {
        match self {
            Navigation::Idle => TransitionStatus::Idle,
            Navigation::Loading { .. } => TransitionStatus::Loading,
            Navigation::Submitting { .. } => TransitionStatus::Submitting,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Navigation::Idle)
    }

    /// Target location of the pending navigation.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Navigation::Idle => None,
            Navigation::Loading { location, .. } | Navigation::Submitting { location, .. } => {
                Some(location)
            }
        }
    }

    pub fn form_method(&self) -> Option<&Method> {
        match self {
            Navigation::Idle => None,
            Navigation::Loading { form_method, .. } => form_method.as_ref(),
            Navigation::Submitting { form_method, .. } => Some(form_method),
        }
    }

    pub fn form_data(&self) -> Option<&FormData> {
        match self {
            Navigation::Idle => None,
            Navigation::Loading { form_data, .. } => form_data.as_ref(),
            Navigation::Submitting { form_data, .. } => Some(form_data),
        }
    }
}

/// Whether an explicit revalidation is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevalidationState {
    #[default]
    Idle,
    Loading,
}

/// Data produced by an out-of-process pre-render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationState {
    pub loader_data: BTreeMap<String, Value>,
    pub action_data: Option<BTreeMap<String, Value>>,
    pub errors: Option<BTreeMap<String, RouteError>>,
}

/// Snapshot of everything the rendering layer observes.
#[derive(Debug, Clone)]
pub struct RouterState {
    pub history_action: HistoryAction,
    pub location: Location,
    /// Matched chain, root to leaf.
    pub matches: Vec<RouteMatch>,
    /// False until the first load completes (or hydration data was given).
    pub initialized: bool,
    pub navigation: Navigation,
    pub revalidation: RevalidationState,
    pub loader_data: BTreeMap<String, LoaderValue>,
    /// Action output keyed by the route that ran the action.
    pub action_data: Option<BTreeMap<String, Value>>,
    /// Errors keyed by the boundary route presenting them.
    pub errors: Option<BTreeMap<String, RouteError>>,
    /// An error reached a chain without any declared boundary.
    pub fatal: bool,
    pub fetchers: BTreeMap<String, Fetcher>,
}

impl RouterState {
    pub fn loader_data_for(&self, route_id: &str) -> Option<&LoaderValue> {
        self.loader_data.get(route_id)
    }

    pub fn action_data_for(&self, route_id: &str) -> Option<&Value> {
        self.action_data.as_ref()?.get(route_id)
    }

    pub fn error_for(&self, route_id: &str) -> Option<&RouteError> {
        self.errors.as_ref()?.get(route_id)
    }

    /// Params of the matched chain.
    pub fn params(&self) -> Params {
        self.matches
            .last()
            .map(|m| m.params.clone())
            .unwrap_or_default()
    }
}

/// A match joined with its loader data and route handle.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMatch {
    pub route_id: String,
    pub pathname: String,
    pub params: Params,
    pub data: Option<LoaderValue>,
    pub handle: Option<Value>,
}

/// How a navigation call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The transition (or the redirect it led to) reached canonical state.
    Committed,
    /// A newer intent took over; nothing from this call was committed.
    Superseded,
}
