//! Fetcher bookkeeping.
//!
//! # Responsibilities
//! - Track the in-flight call per fetcher key
//! - Supersede an older call when the same key is reused
//! - Hand out generation tickets so stale completions can be dropped
//!
//! # Design Decisions
//! - Supersession is per key; keys never affect each other
//! - The registry holds no fetcher state itself: the `fetchers` slice of
//!   the router state is the single source observers read

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use hyper::Method;
use serde_json::Value;

use crate::lifecycle::abort::{AbortController, AbortSignal};
use crate::location::FormData;
use crate::navigation::data::Submission;
use crate::navigation::error::RouteError;
use crate::navigation::state::TransitionStatus;

/// Observable state of one fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetcher {
    pub state: TransitionStatus,
    /// Last successful result; kept while a new call is in flight.
    pub data: Option<Value>,
    pub form_method: Option<Method>,
    pub form_data: Option<FormData>,
    /// Failure of the last call, never written to the main `errors`.
    pub error: Option<RouteError>,
    /// Route that would present `error`.
    pub boundary_id: Option<String>,
}

impl Fetcher {
    pub fn idle() -> Self {
        Self {
            state: TransitionStatus::Idle,
            data: None,
            form_method: None,
            form_data: None,
            error: None,
            boundary_id: None,
        }
    }

    pub fn loading(data: Option<Value>, submission: Option<&Submission>) -> Self {
        Self {
            state: TransitionStatus::Loading,
            data,
            form_method: submission.map(|s| s.method.clone()),
            form_data: submission.map(|s| s.form_data.clone()),
            ..Self::idle()
        }
    }

    pub fn submitting(data: Option<Value>, submission: &Submission) -> Self {
        Self {
            state: TransitionStatus::Submitting,
            data,
            form_method: Some(submission.method.clone()),
            form_data: Some(submission.form_data.clone()),
            ..Self::idle()
        }
    }

    pub fn done(data: Option<Value>) -> Self {
        Self {
            data,
            ..Self::idle()
        }
    }

    pub fn failed(error: RouteError, boundary_id: Option<String>) -> Self {
        Self {
            error: Some(error),
            boundary_id,
            ..Self::idle()
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == TransitionStatus::Idle
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::idle()
    }
}

/// Proof of one fetcher call, checked before its results are committed.
#[derive(Debug, Clone)]
pub struct FetcherTicket {
    pub key: String,
    pub generation: u64,
    pub signal: AbortSignal,
}

struct FetcherCall {
    generation: u64,
    controller: AbortController,
}

/// In-flight fetcher calls keyed by fetcher key.
#[derive(Default)]
pub struct FetcherRegistry {
    calls: DashMap<String, FetcherCall>,
    generations: AtomicU64,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Random key for a fetcher created without one.
    pub fn generate_key() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Register a new call for `key`, aborting the previous one.
    pub fn start(&self, key: &str) -> FetcherTicket {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let controller = AbortController::new();
        let signal = controller.signal();

        if let Some(previous) = self.calls.insert(
            key.to_string(),
            FetcherCall {
                generation,
                controller,
            },
        ) {
            previous.controller.abort();
            tracing::debug!(
                fetcher_key = %key,
                superseded = previous.generation,
                "Fetcher call superseded"
            );
        }

        FetcherTicket {
            key: key.to_string(),
            generation,
            signal,
        }
    }

    /// True while `ticket` is the latest call for its key.
    pub fn is_current(&self, ticket: &FetcherTicket) -> bool {
        self.calls
            .get(&ticket.key)
            .is_some_and(|call| call.generation == ticket.generation)
    }

    /// Forget a completed call. A newer call under the same key is kept.
    pub fn finish(&self, ticket: &FetcherTicket) {
        self.calls
            .remove_if(&ticket.key, |_, call| call.generation == ticket.generation);
    }

    /// Abort and forget whatever runs under `key`.
    pub fn remove(&self, key: &str) -> bool {
        match self.calls.remove(key) {
            Some((_, call)) => {
                call.controller.abort();
                true
            }
            None => false,
        }
    }

    pub fn abort_all(&self) {
        for call in self.calls.iter() {
            call.controller.abort();
        }
        self.calls.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("in_flight", &self.calls.len())
            .finish()
    }
}
