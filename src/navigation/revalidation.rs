//! Which loaders a transition runs.
//!
//! # Responsibilities
//! - Diff the current chain against the next one by position and route id
//! - Apply the default revalidation rules
//! - Let a route's `should_revalidate` policy override the default
//!
//! # Design Decisions
//! - A route is "new" when the route at its position differs or it has no
//!   data yet; new routes always load, policies are not consulted
//! - Params are chain-wide, so a route's own change is judged by its
//!   matched pathname (plus the splat value for splat routes)
//! - Routes without a loader never load

use std::collections::BTreeMap;

use serde_json::Value;

use crate::location::Location;
use crate::navigation::data::{ShouldRevalidateArgs, Submission};
use crate::navigation::state::LoaderValue;
use crate::routing::matcher::SPLAT_PARAM;
use crate::routing::{RouteMatch, RouteTree};

/// Everything a revalidation decision looks at.
#[derive(Debug, Clone, Copy)]
pub struct LoadPlan<'a> {
    pub tree: &'a RouteTree,
    pub current_location: &'a Location,
    pub current_matches: &'a [RouteMatch],
    pub current_loader_data: &'a BTreeMap<String, LoaderValue>,
    pub next_location: &'a Location,
    pub next_matches: &'a [RouteMatch],
    pub submission: Option<&'a Submission>,
    pub action_result: Option<&'a Value>,
    /// An action ran or revalidation was requested explicitly.
    pub force: bool,
}

/// Matches of `plan.next_matches` whose loaders must run, in chain order.
pub fn matches_to_load(plan: &LoadPlan<'_>) -> Vec<RouteMatch> {
    plan.next_matches
        .iter()
        .enumerate()
        .filter(|(index, next)| {
            let Some(route) = plan.tree.route(&next.route_id) else {
                return false;
            };
            if route.loader.is_none() {
                return false;
            }

            let current = plan.current_matches.get(*index);
            let is_new = current.map_or(true, |c| c.route_id != next.route_id)
                || !plan.current_loader_data.contains_key(&next.route_id);
            if is_new {
                return true;
            }
            let Some(current) = current else {
                return true;
            };

            let current_url = plan.current_location.url();
            let next_url = plan.next_location.url();
            let splat_changed = route.path.as_deref().is_some_and(|p| p.ends_with('*'))
                && current.params.get(SPLAT_PARAM) != next.params.get(SPLAT_PARAM);
            let default_should_revalidate = current.pathname != next.pathname
                || splat_changed
                || current_url == next_url
                || plan.current_location.search != plan.next_location.search
                || plan.force;

            match &route.should_revalidate {
                Some(policy) => policy(&ShouldRevalidateArgs {
                    current_url,
                    current_params: current.params.clone(),
                    next_url,
                    next_params: next.params.clone(),
                    form_method: plan.submission.map(|s| s.method.clone()),
                    form_data: plan.submission.map(|s| s.form_data.clone()),
                    action_result: plan.action_result.cloned(),
                    default_should_revalidate,
                }),
                None => default_should_revalidate,
            }
        })
        .map(|(_, m)| m.clone())
        .collect()
}
