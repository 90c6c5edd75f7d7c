//! The router: navigation state machine and fetcher driver.
//!
//! # Responsibilities
//! - Own the canonical [`RouterState`] and publish every commit in order
//! - Turn navigate / go / revalidate intents into loader and action calls
//! - Supersede in-flight navigations (last intent wins)
//! - Drive fetchers against their own slice of state
//!
//! # Design Decisions
//! - State lives in an `ArcSwap`: snapshots are lock-free and keep the
//!   same `Arc` until the next commit
//! - Every write goes through one commit lock that checks the writer still
//!   owns the state (navigation id or fetcher ticket) before swapping;
//!   listeners run after the lock is released
//! - Loaders and actions run as spawned tasks; a superseded navigation
//!   stops waiting for them but does not kill them
//! - Supersession is an outcome, never an error

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use arc_swap::ArcSwap;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use hyper::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::watch;

use crate::config::RouterConfig;
use crate::deferred::DeferredData;
use crate::fetcher::{Fetcher, FetcherRegistry, FetcherTicket};
use crate::lifecycle::abort::{AbortController, AbortSignal};
use crate::location::path::{join_paths, normalize_pathname};
use crate::location::{parse_path, resolve_path, HistoryAction, Location, MemoryHistory, Path};
use crate::navigation::boundary::{
    find_nearest_boundary, matches_until, not_found_matches, target_match, Boundary,
};
use crate::navigation::data::{
    DataFunctionArgs, DataRequest, DataResponse, LoaderFn, Submission,
};
use crate::navigation::error::{ErrorResponse, Redirect, RouteError, RouterError, RouterResult};
use crate::navigation::revalidation::{matches_to_load, LoadPlan};
use crate::navigation::state::{
    DataMatch, HydrationState, LoaderValue, Navigation, NavigationOutcome, RevalidationState,
    RouterState, TransitionStatus,
};
use crate::observability::metrics;
use crate::routing::{RouteHandlers, RouteMatch, RouteTree};
use crate::subscription::{Subscription, SubscriptionBus};

/// Redirects followed in a row before a navigation gives up.
pub const DEFAULT_MAX_REDIRECTS: usize = 20;

/// Everything needed to create a [`Router`].
#[derive(Debug)]
pub struct RouterOptions {
    pub routes: RouteTree,
    /// Normalized basename; `None` for "/".
    pub basename: Option<String>,
    pub history: MemoryHistory,
    pub hydration: Option<HydrationState>,
    pub max_redirects: usize,
}

impl RouterOptions {
    pub fn new(routes: RouteTree) -> Self {
        Self {
            routes,
            basename: None,
            history: MemoryHistory::default(),
            hydration: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn basename(mut self, basename: &str) -> Self {
        let normalized = normalize_pathname(basename);
        self.basename = (normalized != "/").then_some(normalized);
        self
    }

    pub fn history(mut self, history: MemoryHistory) -> Self {
        self.history = history;
        self
    }

    /// Seed history from hrefs; the last one is current.
    pub fn initial_entries(self, entries: &[&str]) -> Self {
        let entries: Vec<String> = entries.iter().map(|e| e.to_string()).collect();
        self.history(MemoryHistory::new(&entries, None))
    }

    pub fn hydration(mut self, hydration: HydrationState) -> Self {
        self.hydration = Some(hydration);
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Build options from a validated config, attaching handlers by id.
    pub fn from_config(config: &RouterConfig, handlers: &RouteHandlers) -> RouterResult<Self> {
        metrics::set_enabled(config.observability.metrics_enabled);
        let routes = RouteTree::from_config(&config.routes, handlers)?;
        let mut options = Self::new(routes);
        options.basename = config.normalized_basename();
        Ok(options
            .history(MemoryHistory::new(
                &config.history.initial_entries,
                config.history.initial_index,
            ))
            .max_redirects(config.max_redirects))
    }
}

/// Options of a single `navigate` call.
#[derive(Debug, Clone, Default)]
pub struct NavigateOptions {
    pub replace: bool,
    pub state: Option<Value>,
    pub submission: Option<Submission>,
}

impl NavigateOptions {
    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }

    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub fn submission(mut self, submission: Submission) -> Self {
        self.submission = Some(submission);
        self
    }
}

/// What a committed navigation does to the history stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryUpdate {
    Push,
    Replace,
    /// Move to an existing entry; `None` stays on the current one.
    Pop(Option<usize>),
    /// Revalidation: leave history and the recorded action alone.
    Keep,
}

struct NavigationRequest {
    location: Location,
    update: HistoryUpdate,
    submission: Option<Submission>,
    /// Explicit revalidation: reported through `revalidation`, not
    /// `navigation`.
    revalidation: bool,
    /// Rerun every loader in the chain.
    force_reload: bool,
    override_navigation: Option<Navigation>,
    redirects: usize,
    /// Shared by every hop of a redirect chain.
    settled: Option<OutcomeSender>,
}

impl NavigationRequest {
    fn new(location: Location, update: HistoryUpdate) -> Self {
        Self {
            location,
            update,
            submission: None,
            revalidation: false,
            force_reload: false,
            override_navigation: None,
            redirects: 0,
            settled: None,
        }
    }
}

/// Final outcome of a navigation, for revalidations that join it.
type OutcomeSender = Arc<watch::Sender<Option<NavigationOutcome>>>;

enum PendingIntent {
    Join(u64, watch::Receiver<Option<NavigationOutcome>>),
    Restart(Location, HistoryUpdate),
    Idle,
}

struct PendingNavigation {
    id: u64,
    controller: AbortController,
    location: Location,
    update: HistoryUpdate,
    /// Carries a mutation submission.
    mutation: bool,
    /// A revalidation is waiting on this navigation instead of restarting it.
    revalidation_joined: bool,
    settled: OutcomeSender,
}

struct Completion {
    location: Location,
    update: HistoryUpdate,
    matches: Vec<RouteMatch>,
    loader_data: BTreeMap<String, LoaderValue>,
    action_data: Option<BTreeMap<String, Value>>,
    errors: BTreeMap<String, RouteError>,
    fatal: bool,
}

enum ActionOutcome {
    Data(String, Value),
    Error(Boundary, RouteError),
    Redirect(Redirect),
    Superseded,
}

struct RouterInner {
    tree: RouteTree,
    basename: Option<String>,
    max_redirects: usize,
    state: ArcSwap<RouterState>,
    history: Mutex<MemoryHistory>,
    commit_lock: Mutex<()>,
    pending: Mutex<Option<PendingNavigation>>,
    navigation_ids: AtomicU64,
    bus: SubscriptionBus<Arc<RouterState>>,
    fetchers: FetcherRegistry,
    disposed: AtomicBool,
}

/// A router instance. Cheap to clone; clones drive the same state.
///
/// One router per application is the expected usage; nothing enforces it.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Create a router. The initial location is matched immediately; loaders
    /// run on [`initialize`](Self::initialize) unless hydration data was
    /// given or no matched route has a loader.
    pub fn new(options: RouterOptions) -> Self {
        let RouterOptions {
            routes,
            basename,
            history,
            hydration,
            max_redirects,
        } = options;

        let location = history.location().clone();
        let (matches, errors, initialized) =
            match routes.match_routes(&location.pathname, basename.as_deref()) {
                Some(matches) => {
                    let needs_load = matches.iter().any(|m| {
                        routes
                            .route(&m.route_id)
                            .is_some_and(|route| route.loader.is_some())
                    });
                    (matches, None, !needs_load)
                }
                None => {
                    let matches = not_found_matches(&routes);
                    let errors = BTreeMap::from([(
                        matches[0].route_id.clone(),
                        RouteError::from(ErrorResponse::not_found(&location.pathname)),
                    )]);
                    (matches, Some(errors), true)
                }
            };

        let mut state = RouterState {
            history_action: history.action(),
            location,
            matches,
            initialized,
            navigation: Navigation::Idle,
            revalidation: RevalidationState::Idle,
            loader_data: BTreeMap::new(),
            action_data: None,
            errors,
            fatal: false,
            fetchers: BTreeMap::new(),
        };

        if let Some(hydration) = hydration {
            state.loader_data = hydration
                .loader_data
                .into_iter()
                .map(|(id, value)| (id, LoaderValue::Data(value)))
                .collect();
            state.action_data = hydration.action_data;
            if hydration.errors.is_some() {
                state.errors = hydration.errors;
            }
            state.initialized = true;
        }

        tracing::info!(
            routes = routes.len(),
            pathname = %state.location.pathname,
            initialized = state.initialized,
            "Router created"
        );

        Self {
            inner: Arc::new(RouterInner {
                tree: routes,
                basename,
                max_redirects,
                state: ArcSwap::from_pointee(state),
                history: Mutex::new(history),
                commit_lock: Mutex::new(()),
                pending: Mutex::new(None),
                navigation_ids: AtomicU64::new(0),
                bus: SubscriptionBus::new(),
                fetchers: FetcherRegistry::new(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Run the initial load. A no-op once initialized.
    pub async fn initialize(&self) -> RouterResult<NavigationOutcome> {
        self.ensure_active()?;
        let state = self.snapshot();
        if state.initialized {
            return Ok(NavigationOutcome::Committed);
        }
        self.start_navigation(NavigationRequest::new(
            state.location.clone(),
            HistoryUpdate::Pop(None),
        ))
        .await
    }

    /// Abort everything in flight and stop accepting intents.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pending) = self.lock_pending().take() {
            pending.controller.abort();
        }
        self.inner.fetchers.abort_all();
        for value in self.snapshot().loader_data.values() {
            if let LoaderValue::Deferred(data) = value {
                data.cancel();
            }
        }
        self.inner.bus.clear();
        tracing::info!("Router disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Current state. The same `Arc` is returned until the next commit.
    pub fn snapshot(&self) -> Arc<RouterState> {
        self.inner.state.load_full()
    }

    /// Observe every commit, in commit order.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Arc<RouterState>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.bus.subscribe(listener)
    }

    pub fn routes(&self) -> &RouteTree {
        &self.inner.tree
    }

    pub fn basename(&self) -> Option<&str> {
        self.inner.basename.as_deref()
    }

    /// Match a pathname against this router's tree and basename.
    pub fn match_routes(&self, pathname: &str) -> Option<Vec<RouteMatch>> {
        self.inner.tree.match_routes(pathname, self.basename())
    }

    /// Current matches joined with loader data and route handles.
    pub fn data_matches(&self) -> Vec<DataMatch> {
        let state = self.snapshot();
        state
            .matches
            .iter()
            .map(|m| DataMatch {
                route_id: m.route_id.clone(),
                pathname: m.pathname.clone(),
                params: m.params.clone(),
                data: state.loader_data.get(&m.route_id).cloned(),
                handle: self
                    .inner
                    .tree
                    .route(&m.route_id)
                    .and_then(|route| route.handle.clone()),
            })
            .collect()
    }

    /// True while a navigation, revalidation or any fetcher is in flight.
    pub fn is_busy(&self) -> bool {
        let state = self.snapshot();
        !state.navigation.is_idle()
            || state.revalidation == RevalidationState::Loading
            || state.fetchers.values().any(|f| !f.is_idle())
    }

    /// Navigate to `to`, resolved against the current location. Absolute
    /// targets are relative to the basename.
    pub async fn navigate(
        &self,
        to: &str,
        options: NavigateOptions,
    ) -> RouterResult<NavigationOutcome> {
        self.ensure_active()?;
        let current = self.snapshot();
        let mut path = self.resolve_href(to, &current.location);

        let submission = options.submission;
        let is_mutation = submission.as_ref().is_some_and(Submission::is_mutation);
        if let Some(submission) = submission.as_ref().filter(|s| !s.is_mutation()) {
            path = path.with_search(submission.form_data.to_query());
        }

        let update = if options.replace || (is_mutation && path == current.location.path()) {
            HistoryUpdate::Replace
        } else {
            HistoryUpdate::Push
        };

        let mut request =
            NavigationRequest::new(MemoryHistory::create_location(path, options.state), update);
        request.submission = submission;
        self.start_navigation(request).await
    }

    /// Submit `submission` to the route matching `to`.
    pub async fn submit(
        &self,
        to: &str,
        submission: Submission,
    ) -> RouterResult<NavigationOutcome> {
        self.navigate(to, NavigateOptions::default().submission(submission))
            .await
    }

    /// Move `delta` entries through history (clamped).
    pub async fn go(&self, delta: isize) -> RouterResult<NavigationOutcome> {
        self.ensure_active()?;
        let (index, location) = {
            let history = self.lock_history();
            let (index, location) = history.peek(delta);
            (index, location.clone())
        };
        self.start_navigation(NavigationRequest::new(
            location,
            HistoryUpdate::Pop(Some(index)),
        ))
        .await
    }

    /// Rerun loaders for the current location. An in-flight loading
    /// navigation is restarted with every loader forced; an in-flight
    /// submission is joined, since its loaders already rerun after the
    /// action.
    pub async fn revalidate(&self) -> RouterResult<NavigationOutcome> {
        self.ensure_active()?;
        let current = self.snapshot();
        let intent = {
            let mut slot = self.lock_pending();
            let intent = match slot.as_mut() {
                Some(pending) if pending.mutation => {
                    pending.revalidation_joined = true;
                    PendingIntent::Join(pending.id, pending.settled.subscribe())
                }
                Some(pending) => PendingIntent::Restart(pending.location.clone(), pending.update),
                None => PendingIntent::Idle,
            };
            intent
        };

        let mut request = match intent {
            PendingIntent::Join(id, settled) => return Ok(self.join_navigation(id, settled).await),
            PendingIntent::Restart(location, update) => {
                let mut request = NavigationRequest::new(location, update);
                request.override_navigation = Some(current.navigation.clone());
                request
            }
            PendingIntent::Idle => {
                NavigationRequest::new(current.location.clone(), HistoryUpdate::Keep)
            }
        };
        request.revalidation = true;
        request.force_reload = true;
        self.start_navigation(request).await
    }

    async fn join_navigation(
        &self,
        id: u64,
        mut settled: watch::Receiver<Option<NavigationOutcome>>,
    ) -> NavigationOutcome {
        tracing::debug!(navigation_id = id, "Revalidation joined pending submission");
        self.commit_if(
            || self.is_pending(id),
            |state| state.revalidation = RevalidationState::Loading,
        );
        // a chain that ends in an error reports it to the submitter only
        let outcome = match settled.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(NavigationOutcome::Superseded),
            Err(_) => NavigationOutcome::Superseded,
        };
        outcome
    }

    fn start_navigation(
        &self,
        mut request: NavigationRequest,
    ) -> BoxFuture<'_, RouterResult<NavigationOutcome>> {
        async move {
            let settled = request
                .settled
                .take()
                .unwrap_or_else(|| Arc::new(watch::channel(None).0));
            let outcome = self.run_navigation(request, settled.clone()).await;
            if let Ok(outcome) = &outcome {
                settled.send_replace(Some(*outcome));
            }
            outcome
        }
        .boxed()
    }

    async fn run_navigation(
        &self,
        request: NavigationRequest,
        settled: OutcomeSender,
    ) -> RouterResult<NavigationOutcome> {
        self.ensure_active()?;
        let id = self.inner.navigation_ids.fetch_add(1, Ordering::SeqCst) + 1;
        let controller = AbortController::new();
        let signal = controller.signal();
        {
            let mut pending = self.lock_pending();
            let previous = pending.replace(PendingNavigation {
                id,
                controller,
                location: request.location.clone(),
                update: request.update,
                mutation: request.submission.as_ref().is_some_and(Submission::is_mutation),
                revalidation_joined: false,
                settled,
            });
            if let Some(previous) = previous {
                previous.controller.abort();
                tracing::info!(
                    navigation_id = previous.id,
                    superseded_by = id,
                    "Navigation superseded"
                );
                metrics::record_navigation("superseded");
            }
        }

        let NavigationRequest {
            location,
            update,
            submission,
            revalidation,
            force_reload,
            override_navigation,
            redirects,
            settled: _,
        } = request;
        tracing::info!(
            navigation_id = id,
            pathname = %location.pathname,
            revalidation = revalidation,
            "Navigation started"
        );

        let tree = &self.inner.tree;
        let Some(matches) = tree.match_routes(&location.pathname, self.basename()) else {
            tracing::warn!(
                navigation_id = id,
                pathname = %location.pathname,
                "No route matches location"
            );
            metrics::record_navigation("not_found");
            metrics::record_route_error("not_found");
            let matches = not_found_matches(tree);
            let errors = BTreeMap::from([(
                matches[0].route_id.clone(),
                RouteError::from(ErrorResponse::not_found(&location.pathname)),
            )]);
            return Ok(self.complete(
                id,
                Completion {
                    location,
                    update,
                    matches,
                    loader_data: BTreeMap::new(),
                    action_data: None,
                    errors,
                    fatal: false,
                },
            ));
        };

        let mut action_data = None;
        let mut action_error = None;
        let mutation = submission.as_ref().filter(|s| s.is_mutation());
        if let Some(mutation) = mutation {
            let submitting = Navigation::Submitting {
                location: location.clone(),
                form_method: mutation.method.clone(),
                form_data: mutation.form_data.clone(),
            };
            if !self.publish_navigation(id, submitting, RevalidationState::Idle) {
                return Ok(NavigationOutcome::Superseded);
            }
            match self.run_action(&matches, &location, mutation, &signal).await {
                ActionOutcome::Superseded => return Ok(NavigationOutcome::Superseded),
                ActionOutcome::Redirect(redirect) => {
                    return self.follow_redirect(id, redirect, true, redirects).await;
                }
                ActionOutcome::Data(route_id, value) => {
                    action_data = Some(BTreeMap::from([(route_id, value)]));
                }
                ActionOutcome::Error(boundary, error) => {
                    action_error = Some((boundary, error));
                }
            }
        }

        let loading = Navigation::Loading {
            location: location.clone(),
            form_method: submission.as_ref().map(|s| s.method.clone()),
            form_data: submission.as_ref().map(|s| s.form_data.clone()),
        };
        let (navigation, revalidation_state) = if revalidation {
            (
                override_navigation.unwrap_or(Navigation::Idle),
                RevalidationState::Loading,
            )
        } else if self.revalidation_joined(id) {
            (loading, RevalidationState::Loading)
        } else {
            (loading, RevalidationState::Idle)
        };
        if !self.publish_navigation(id, navigation, revalidation_state) {
            return Ok(NavigationOutcome::Superseded);
        }

        let current = self.snapshot();
        let load_matches = match &action_error {
            Some((boundary, _)) => matches_until(&matches, &boundary.route_id),
            None => matches.clone(),
        };
        let action_result = action_data.as_ref().and_then(|data| data.values().next());
        let to_load = matches_to_load(&LoadPlan {
            tree,
            current_location: &current.location,
            current_matches: &current.matches,
            current_loader_data: &current.loader_data,
            next_location: &location,
            next_matches: &load_matches,
            submission: submission.as_ref(),
            action_result,
            force: force_reload || mutation.is_some(),
        });

        let Some(results) = self.run_loaders(&to_load, &location, &signal).await else {
            return Ok(NavigationOutcome::Superseded);
        };

        let redirect = results.iter().find_map(|(_, result)| match result {
            Ok(DataResponse::Redirect(redirect)) | Err(RouteError::Redirect(redirect)) => {
                Some(redirect.clone())
            }
            _ => None,
        });
        if let Some(redirect) = redirect {
            cancel_deferred_results(&results);
            return self.follow_redirect(id, redirect, false, redirects).await;
        }

        let mut errors = BTreeMap::new();
        let mut fatal = false;
        if let Some((boundary, error)) = action_error {
            fatal |= !boundary.declared;
            errors.insert(boundary.route_id, error);
        }

        let mut loaded = BTreeMap::new();
        for (route_id, result) in results {
            match result {
                Ok(DataResponse::Data(value)) => {
                    loaded.insert(route_id, LoaderValue::Data(value));
                }
                Ok(DataResponse::Deferred(data)) => {
                    loaded.insert(route_id, LoaderValue::Deferred(data));
                }
                Ok(DataResponse::Redirect(_)) => {}
                Err(error) => {
                    let Some(boundary) = find_nearest_boundary(tree, &matches, Some(route_id.as_str()))
                    else {
                        continue;
                    };
                    tracing::warn!(
                        navigation_id = id,
                        route_id = %route_id,
                        boundary_id = %boundary.route_id,
                        error = %error,
                        "Loader failed"
                    );
                    metrics::record_route_error("loader");
                    fatal |= !boundary.declared;
                    errors.entry(boundary.route_id).or_insert(error);
                }
            }
        }

        let reloaded: HashSet<&str> = to_load.iter().map(|m| m.route_id.as_str()).collect();
        let mut loader_data = BTreeMap::new();
        for m in &matches {
            if let Some(value) = loaded.remove(&m.route_id) {
                loader_data.insert(m.route_id.clone(), value);
            } else if !reloaded.contains(m.route_id.as_str()) {
                if let Some(value) = current.loader_data.get(&m.route_id) {
                    loader_data.insert(m.route_id.clone(), value.clone());
                }
            }
            if errors.contains_key(&m.route_id) {
                break;
            }
        }
        // below an error boundary: loaded but never shown
        for value in loaded.values() {
            if let LoaderValue::Deferred(data) = value {
                data.cancel();
            }
        }

        let action_data = if action_data.is_some() {
            action_data
        } else if revalidation {
            current.action_data.clone()
        } else {
            None
        };

        Ok(self.complete(
            id,
            Completion {
                location,
                update,
                matches,
                loader_data,
                action_data,
                errors,
                fatal,
            },
        ))
    }

    async fn run_action(
        &self,
        matches: &[RouteMatch],
        location: &Location,
        submission: &Submission,
        signal: &AbortSignal,
    ) -> ActionOutcome {
        let tree = &self.inner.tree;
        let Some(target) = target_match(tree, matches, &location.search) else {
            return ActionOutcome::Superseded;
        };
        let boundary = || {
            find_nearest_boundary(tree, matches, Some(target.route_id.as_str())).unwrap_or(Boundary {
                route_id: target.route_id.clone(),
                declared: false,
            })
        };

        let Some(action) = tree.route(&target.route_id).and_then(|r| r.action.clone()) else {
            tracing::warn!(
                route_id = %target.route_id,
                method = %submission.method,
                "Submission to a route without an action"
            );
            metrics::record_route_error("method_not_allowed");
            let error = ErrorResponse::method_not_allowed(
                submission.method.as_str(),
                &location.pathname,
                &target.route_id,
            );
            return ActionOutcome::Error(boundary(), error.into());
        };

        let args = DataFunctionArgs {
            params: target.params.clone(),
            request: data_request(location, Some(submission), signal.clone()),
        };
        match call_handler(target.route_id.clone(), action, args, signal.clone()).await {
            None => ActionOutcome::Superseded,
            Some(Ok(DataResponse::Data(value))) => {
                ActionOutcome::Data(target.route_id.clone(), value)
            }
            Some(Ok(DataResponse::Redirect(redirect))) | Some(Err(RouteError::Redirect(redirect))) => {
                ActionOutcome::Redirect(redirect)
            }
            Some(Ok(DataResponse::Deferred(data))) => {
                data.cancel();
                metrics::record_route_error("action");
                ActionOutcome::Error(
                    boundary(),
                    RouteError::msg("deferred data is not supported from actions"),
                )
            }
            Some(Err(error)) => {
                tracing::warn!(
                    route_id = %target.route_id,
                    error = %error,
                    "Action failed"
                );
                metrics::record_route_error("action");
                ActionOutcome::Error(boundary(), error)
            }
        }
    }

    /// Call the loaders of `to_load` concurrently. `None` when the
    /// navigation was aborted before all of them finished.
    async fn run_loaders(
        &self,
        to_load: &[RouteMatch],
        location: &Location,
        signal: &AbortSignal,
    ) -> Option<Vec<(String, Result<DataResponse, RouteError>)>> {
        let calls = to_load.iter().filter_map(|m| {
            let loader = self.inner.tree.route(&m.route_id)?.loader.clone()?;
            let args = DataFunctionArgs {
                params: m.params.clone(),
                request: data_request(location, None, signal.clone()),
            };
            let route_id = m.route_id.clone();
            Some(
                call_handler(route_id.clone(), loader, args, signal.clone())
                    .map(move |result| (route_id, result)),
            )
        });

        let mut results = Vec::with_capacity(to_load.len());
        let mut aborted = false;
        for (route_id, result) in join_all(calls).await {
            match result {
                Some(result) => results.push((route_id, result)),
                None => aborted = true,
            }
        }
        if aborted {
            cancel_deferred_results(&results);
            return None;
        }
        Some(results)
    }

    async fn follow_redirect(
        &self,
        id: u64,
        redirect: Redirect,
        from_submission: bool,
        redirects: usize,
    ) -> RouterResult<NavigationOutcome> {
        let Some(pending) = self.take_pending_entry(id) else {
            return Ok(NavigationOutcome::Superseded);
        };
        let count = redirects + 1;
        tracing::info!(
            navigation_id = id,
            location = %redirect.location,
            status = redirect.status,
            "Following redirect"
        );
        metrics::record_navigation("redirected");

        if count > self.inner.max_redirects {
            tracing::error!(location = %redirect.location, redirects = count, "Too many redirects");
            self.commit_if(
                || true,
                |state| {
                    state.navigation = Navigation::Idle;
                    state.revalidation = RevalidationState::Idle;
                },
            );
            return Err(RouterError::RedirectLoop {
                location: redirect.location,
            });
        }

        let current = self.snapshot();
        let path = self.resolve_href(&redirect.location, &current.location);
        let update = if from_submission {
            HistoryUpdate::Replace
        } else {
            HistoryUpdate::Push
        };
        let mut request = NavigationRequest::new(MemoryHistory::create_location(path, None), update);
        request.force_reload = from_submission;
        request.redirects = count;
        request.settled = Some(pending.settled);
        self.start_navigation(request).await
    }

    fn complete(&self, id: u64, completion: Completion) -> NavigationOutcome {
        let Completion {
            location,
            update,
            matches,
            loader_data,
            action_data,
            errors,
            fatal,
        } = completion;
        let created: Vec<DeferredData> = loader_data
            .values()
            .filter_map(LoaderValue::as_deferred)
            .cloned()
            .collect();
        let pathname = location.pathname.clone();

        let committed = self.commit_if(
            || self.take_pending(id),
            |state| {
                let history_action = {
                    let mut history = self.lock_history();
                    match update {
                        HistoryUpdate::Push => history.push(location.clone()),
                        HistoryUpdate::Replace => history.replace(location.clone()),
                        HistoryUpdate::Pop(Some(index)) => history.go_to(index),
                        HistoryUpdate::Pop(None) | HistoryUpdate::Keep => {}
                    }
                    match update {
                        HistoryUpdate::Push => HistoryAction::Push,
                        HistoryUpdate::Replace => HistoryAction::Replace,
                        HistoryUpdate::Pop(_) => HistoryAction::Pop,
                        HistoryUpdate::Keep => state.history_action,
                    }
                };

                let stale = stale_deferreds(&state.loader_data, &loader_data);
                *state = RouterState {
                    history_action,
                    location,
                    matches,
                    initialized: true,
                    navigation: Navigation::Idle,
                    revalidation: RevalidationState::Idle,
                    loader_data,
                    action_data,
                    errors: (!errors.is_empty()).then_some(errors),
                    fatal,
                    fetchers: std::mem::take(&mut state.fetchers),
                };
                stale
            },
        );

        match committed {
            Some(stale) => {
                for data in stale {
                    data.cancel();
                }
                tracing::info!(
                    navigation_id = id,
                    pathname = %pathname,
                    fatal = fatal,
                    "Navigation committed"
                );
                metrics::record_navigation("committed");
                NavigationOutcome::Committed
            }
            None => {
                for data in created {
                    data.cancel();
                }
                NavigationOutcome::Superseded
            }
        }
    }

    fn publish_navigation(
        &self,
        id: u64,
        navigation: Navigation,
        revalidation: RevalidationState,
    ) -> bool {
        self.commit_if(
            || self.is_pending(id),
            |state| {
                state.navigation = navigation;
                state.revalidation = revalidation;
            },
        )
        .is_some()
    }

    /// Apply `update` to a copy of the state and swap it in, if `guard`
    /// still holds under the commit lock. Listeners run after the lock is
    /// released.
    fn commit_if<R>(
        &self,
        guard: impl FnOnce() -> bool,
        update: impl FnOnce(&mut RouterState) -> R,
    ) -> Option<R> {
        let output = {
            let _commit = self
                .inner
                .commit_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !guard() {
                return None;
            }
            let mut next = RouterState::clone(&self.inner.state.load());
            let output = update(&mut next);
            let next = Arc::new(next);
            self.inner.state.store(next.clone());
            self.inner.bus.enqueue(next);
            output
        };
        self.inner.bus.flush();
        Some(output)
    }

    fn is_pending(&self, id: u64) -> bool {
        self.lock_pending().as_ref().is_some_and(|p| p.id == id)
    }

    fn take_pending(&self, id: u64) -> bool {
        self.take_pending_entry(id).is_some()
    }

    fn take_pending_entry(&self, id: u64) -> Option<PendingNavigation> {
        let mut pending = self.lock_pending();
        if pending.as_ref().is_some_and(|p| p.id == id) {
            pending.take()
        } else {
            None
        }
    }

    fn revalidation_joined(&self, id: u64) -> bool {
        self.lock_pending()
            .as_ref()
            .is_some_and(|p| p.id == id && p.revalidation_joined)
    }

    fn ensure_active(&self) -> RouterResult<()> {
        if self.is_disposed() {
            Err(RouterError::Disposed)
        } else {
            Ok(())
        }
    }

    fn resolve_href(&self, to: &str, from: &Location) -> Path {
        let parsed = parse_path(to);
        if !parsed.pathname.starts_with('/') {
            return resolve_path(&parsed, &from.pathname);
        }
        let mut path = resolve_path(&parsed, "/");
        if let Some(basename) = self.basename() {
            path.pathname = if path.pathname == "/" {
                basename.to_string()
            } else {
                join_paths([basename, path.pathname.as_str()])
            };
        }
        path
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingNavigation>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_history(&self) -> MutexGuard<'_, MemoryHistory> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // --- Fetchers ---

    /// State of fetcher `key`; idle when unknown.
    pub fn get_fetcher(&self, key: &str) -> Fetcher {
        self.snapshot()
            .fetchers
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Abort and forget fetcher `key`.
    pub fn delete_fetcher(&self, key: &str) {
        self.inner.fetchers.remove(key);
        self.commit_if(
            || self.inner.state.load().fetchers.contains_key(key),
            |state| {
                state.fetchers.remove(key);
            },
        );
    }

    /// A fetcher with a generated key, deleted when the handle is dropped.
    pub fn fetcher(&self) -> FetcherHandle {
        FetcherHandle {
            key: FetcherRegistry::generate_key(),
            router: self.clone(),
        }
    }

    /// Load `href` (no submission, or a GET one) or submit to it, outside
    /// the main navigation. A newer call under the same key supersedes this
    /// one, which then returns without touching state.
    pub async fn fetch(
        &self,
        key: &str,
        href: &str,
        submission: Option<Submission>,
    ) -> RouterResult<()> {
        self.ensure_active()?;
        let ticket = self.inner.fetchers.start(key);
        let current = self.snapshot();
        let mut path = self.resolve_href(href, &current.location);
        if let Some(submission) = submission.as_ref().filter(|s| !s.is_mutation()) {
            path = path.with_search(submission.form_data.to_query());
        }
        let location = MemoryHistory::create_location(path, None);
        let previous = current.fetchers.get(key).and_then(|f| f.data.clone());
        tracing::debug!(fetcher_key = %key, href = %location.href(), "Fetcher started");

        let tree = &self.inner.tree;
        let Some(matches) = tree.match_routes(&location.pathname, self.basename()) else {
            let boundary = not_found_matches(tree)[0].route_id.clone();
            let error = ErrorResponse::not_found(&location.pathname).into();
            metrics::record_fetcher("load", "not_found");
            self.finish_fetcher(&ticket, Fetcher::failed(error, Some(boundary)));
            return Ok(());
        };
        let Some(target) = target_match(tree, &matches, &location.search).cloned() else {
            return Ok(());
        };

        match submission {
            Some(submission) if submission.is_mutation() => {
                self.fetch_submit(ticket, location, &matches, target, submission, previous)
                    .await
            }
            submission => {
                self.fetch_load(ticket, location, &matches, target, submission, previous)
                    .await
            }
        }
    }

    async fn fetch_submit(
        &self,
        ticket: FetcherTicket,
        location: Location,
        matches: &[RouteMatch],
        target: RouteMatch,
        submission: Submission,
        previous: Option<Value>,
    ) -> RouterResult<()> {
        if !self.update_fetcher(&ticket, Fetcher::submitting(previous, &submission)) {
            return Ok(());
        }
        let boundary_id = self.boundary_id(matches, &target);

        let Some(action) = self.inner.tree.route(&target.route_id).and_then(|r| r.action.clone())
        else {
            let error = ErrorResponse::method_not_allowed(
                submission.method.as_str(),
                &location.pathname,
                &target.route_id,
            );
            metrics::record_fetcher("submit", "error");
            self.finish_fetcher(&ticket, Fetcher::failed(error.into(), boundary_id));
            return Ok(());
        };

        let args = DataFunctionArgs {
            params: target.params.clone(),
            request: data_request(&location, Some(&submission), ticket.signal.clone()),
        };
        let Some(result) =
            call_handler(target.route_id.clone(), action, args, ticket.signal.clone()).await
        else {
            metrics::record_fetcher("submit", "superseded");
            return Ok(());
        };

        match result {
            Ok(DataResponse::Data(value)) => {
                let loading = Fetcher::loading(Some(value.clone()), Some(&submission));
                if !self.update_fetcher(&ticket, loading) {
                    return Ok(());
                }
                metrics::record_fetcher("submit", "ok");
                let revalidated = self.revalidate().await;
                self.finish_fetcher(&ticket, Fetcher::done(Some(value)));
                revalidated.map(|_| ())
            }
            Ok(DataResponse::Redirect(redirect)) | Err(RouteError::Redirect(redirect)) => {
                metrics::record_fetcher("submit", "redirect");
                self.fetcher_redirect(&ticket, redirect).await
            }
            Ok(DataResponse::Deferred(data)) => {
                data.cancel();
                metrics::record_fetcher("submit", "error");
                let error = RouteError::msg("deferred data is not supported from actions");
                self.finish_fetcher(&ticket, Fetcher::failed(error, boundary_id));
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    fetcher_key = %ticket.key,
                    route_id = %target.route_id,
                    error = %error,
                    "Fetcher action failed"
                );
                metrics::record_fetcher("submit", "error");
                self.finish_fetcher(&ticket, Fetcher::failed(error, boundary_id));
                Ok(())
            }
        }
    }

    async fn fetch_load(
        &self,
        ticket: FetcherTicket,
        location: Location,
        matches: &[RouteMatch],
        target: RouteMatch,
        submission: Option<Submission>,
        previous: Option<Value>,
    ) -> RouterResult<()> {
        if !self.update_fetcher(&ticket, Fetcher::loading(previous, submission.as_ref())) {
            return Ok(());
        }
        let boundary_id = self.boundary_id(matches, &target);

        let Some(loader) = self.inner.tree.route(&target.route_id).and_then(|r| r.loader.clone())
        else {
            let error = ErrorResponse::new(
                StatusCode::METHOD_NOT_ALLOWED,
                format!(
                    "Route \"{}\" has no loader to fetch \"{}\" from",
                    target.route_id, location.pathname
                ),
            );
            metrics::record_fetcher("load", "error");
            self.finish_fetcher(&ticket, Fetcher::failed(error.into(), boundary_id));
            return Ok(());
        };

        let args = DataFunctionArgs {
            params: target.params.clone(),
            request: data_request(&location, None, ticket.signal.clone()),
        };
        let Some(result) = call_handler(target.route_id.clone(), loader, args, ticket.signal.clone()).await
        else {
            metrics::record_fetcher("load", "superseded");
            return Ok(());
        };

        match result {
            Ok(DataResponse::Data(value)) => {
                metrics::record_fetcher("load", "ok");
                self.finish_fetcher(&ticket, Fetcher::done(Some(value)));
                Ok(())
            }
            Ok(DataResponse::Deferred(data)) => {
                // fetchers report once everything settled
                let aborted = tokio::select! {
                    aborted = data.settled() => aborted,
                    _ = ticket.signal.aborted() => true,
                };
                if aborted {
                    data.cancel();
                    metrics::record_fetcher("load", "superseded");
                    return Ok(());
                }
                metrics::record_fetcher("load", "ok");
                self.finish_fetcher(&ticket, Fetcher::done(Some(Value::Object(data.ready_data()))));
                Ok(())
            }
            Ok(DataResponse::Redirect(redirect)) | Err(RouteError::Redirect(redirect)) => {
                metrics::record_fetcher("load", "redirect");
                self.fetcher_redirect(&ticket, redirect).await
            }
            Err(error) => {
                tracing::warn!(
                    fetcher_key = %ticket.key,
                    route_id = %target.route_id,
                    error = %error,
                    "Fetcher loader failed"
                );
                metrics::record_fetcher("load", "error");
                self.finish_fetcher(&ticket, Fetcher::failed(error, boundary_id));
                Ok(())
            }
        }
    }

    async fn fetcher_redirect(&self, ticket: &FetcherTicket, redirect: Redirect) -> RouterResult<()> {
        if !self.finish_fetcher(ticket, Fetcher::done(None)) {
            return Ok(());
        }
        tracing::info!(
            fetcher_key = %ticket.key,
            location = %redirect.location,
            "Fetcher redirected, navigating"
        );
        self.navigate(&redirect.location, NavigateOptions::default())
            .await
            .map(|_| ())
    }

    fn boundary_id(&self, matches: &[RouteMatch], target: &RouteMatch) -> Option<String> {
        find_nearest_boundary(&self.inner.tree, matches, Some(target.route_id.as_str()))
            .map(|boundary| boundary.route_id)
    }

    fn update_fetcher(&self, ticket: &FetcherTicket, fetcher: Fetcher) -> bool {
        self.commit_if(
            || self.inner.fetchers.is_current(ticket),
            |state| {
                state.fetchers.insert(ticket.key.clone(), fetcher);
            },
        )
        .is_some()
    }

    fn finish_fetcher(&self, ticket: &FetcherTicket, fetcher: Fetcher) -> bool {
        let committed = self.update_fetcher(ticket, fetcher);
        self.inner.fetchers.finish(ticket);
        committed
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.snapshot();
        f.debug_struct("Router")
            .field("location", &state.location.href())
            .field("navigation", &state.navigation.status())
            .field("fetchers", &state.fetchers.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A fetcher owned by one observer. Dropping it deletes the fetcher.
#[derive(Debug)]
pub struct FetcherHandle {
    key: String,
    router: Router,
}

impl FetcherHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> Fetcher {
        self.router.get_fetcher(&self.key)
    }

    pub fn status(&self) -> TransitionStatus {
        self.state().state
    }

    pub async fn load(&self, href: &str) -> RouterResult<()> {
        self.router.fetch(&self.key, href, None).await
    }

    pub async fn submit(&self, href: &str, submission: Submission) -> RouterResult<()> {
        self.router.fetch(&self.key, href, Some(submission)).await
    }
}

impl Drop for FetcherHandle {
    fn drop(&mut self) {
        self.router.delete_fetcher(&self.key);
    }
}

fn data_request(
    location: &Location,
    submission: Option<&Submission>,
    signal: AbortSignal,
) -> DataRequest {
    DataRequest {
        url: location.url(),
        pathname: location.pathname.clone(),
        search: location.search.clone(),
        method: submission.map_or(Method::GET, |s| s.method.clone()),
        form_data: submission.map(|s| s.form_data.clone()),
        signal,
    }
}

/// Run one loader or action as its own task. Returns `None` as soon as
/// `signal` fires; the task keeps running and anything deferred it
/// produces is cancelled.
async fn call_handler(
    route_id: String,
    handler: LoaderFn,
    args: DataFunctionArgs,
    signal: AbortSignal,
) -> Option<Result<DataResponse, RouteError>> {
    let task_signal = signal.clone();
    let task_route = route_id.clone();
    let task = tokio::spawn(async move {
        let start = Instant::now();
        let result = handler(args).await;
        metrics::record_loader(&task_route, start);
        if task_signal.is_aborted() {
            if let Ok(DataResponse::Deferred(data)) = &result {
                data.cancel();
            }
        }
        result
    });

    tokio::select! {
        joined = task => Some(joined.unwrap_or_else(|error| {
            tracing::error!(route_id = %route_id, error = %error, "Handler task failed");
            Err(RouteError::msg(format!("handler for route {route_id:?} failed: {error}")))
        })),
        _ = signal.aborted() => None,
    }
}

fn cancel_deferred_results(results: &[(String, Result<DataResponse, RouteError>)]) {
    for (_, result) in results {
        if let Ok(DataResponse::Deferred(data)) = result {
            data.cancel();
        }
    }
}

/// Deferred containers in `old` that `new` no longer holds.
fn stale_deferreds(
    old: &BTreeMap<String, LoaderValue>,
    new: &BTreeMap<String, LoaderValue>,
) -> Vec<DeferredData> {
    old.iter()
        .filter_map(|(route_id, value)| {
            let data = value.as_deferred()?;
            let kept = new
                .get(route_id)
                .and_then(LoaderValue::as_deferred)
                .is_some_and(|next| next.ptr_eq(data));
            (!kept).then(|| data.clone())
        })
        .collect()
}
