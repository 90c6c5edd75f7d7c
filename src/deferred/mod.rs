//! Deferred value container.
//!
//! # Data Flow
//! ```text
//! loader returns DeferredData::builder()
//!         .critical("title", ..)        → Ready immediately
//!         .lazy("comments", future)     → Pending, settled by a spawned task
//!     → router commits without waiting for lazy entries
//!     → task settles entry → Ready / Error(Rejected)
//!     → subscribers notified, `resolve(key)` waiters woken
//!
//! Owning navigation superseded:
//!     → cancel() → every Pending entry becomes Error(Aborted)
//! ```
//!
//! # Design Decisions
//! - The key set is fixed at construction
//! - Each entry reaches a terminal state exactly once; later settlements
//!   are ignored
//! - Errors stay scoped to their entry; other keys are unaffected

pub mod tracked;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::lifecycle::abort::AbortController;
use crate::navigation::error::RouteError;
use crate::observability::metrics;
use crate::subscription::{Subscription, SubscriptionBus};

pub use tracked::{DeferredError, DeferredEvent, TrackedValue};

/// Input value for one key of a deferred container.
pub enum DeferredValue {
    Ready(Value),
    Pending(BoxFuture<'static, Result<Value, RouteError>>),
}

impl std::fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeferredValue::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            DeferredValue::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Collects entries for a [`DeferredData`].
#[derive(Debug, Default)]
pub struct DeferredBuilder {
    entries: Vec<(String, DeferredValue)>,
}

impl DeferredBuilder {
    /// An entry that is available as soon as the container exists.
    pub fn critical(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .push((key.into(), DeferredValue::Ready(value.into())));
        self
    }

    /// An entry that settles later.
    pub fn lazy<F>(mut self, key: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Result<Value, RouteError>> + Send + 'static,
    {
        self.entries
            .push((key.into(), DeferredValue::Pending(future.boxed())));
        self
    }

    /// Build the container and start settling lazy entries. Must be called
    /// from within a Tokio runtime.
    pub fn build(self) -> DeferredData {
        DeferredData::new(self.entries)
    }
}

/// A set of values, some resolved and some still pending.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct DeferredData {
    inner: Arc<DeferredInner>,
}

struct DeferredInner {
    keys: Vec<String>,
    entries: Mutex<HashMap<String, TrackedValue>>,
    controller: AbortController,
    version: watch::Sender<u64>,
    events: SubscriptionBus<DeferredEvent>,
}

impl DeferredData {
    pub fn builder() -> DeferredBuilder {
        DeferredBuilder::default()
    }

    /// Build from entries. Duplicate keys keep the last value. Must be
    /// called from within a Tokio runtime when any entry is pending.
    pub fn new(values: impl IntoIterator<Item = (String, DeferredValue)>) -> Self {
        let mut keys = Vec::new();
        let mut entries = HashMap::new();
        let mut pending = Vec::new();

        for (key, value) in values {
            if !entries.contains_key(&key) {
                keys.push(key.clone());
            }
            match value {
                DeferredValue::Ready(value) => {
                    entries.insert(key, TrackedValue::Ready(value));
                }
                DeferredValue::Pending(future) => {
                    entries.insert(key.clone(), TrackedValue::Pending);
                    pending.push((key, future));
                }
            }
        }

        let (version, _) = watch::channel(0);
        let data = Self {
            inner: Arc::new(DeferredInner {
                keys,
                entries: Mutex::new(entries),
                controller: AbortController::new(),
                version,
                events: SubscriptionBus::new(),
            }),
        };

        for (key, future) in pending {
            data.track(key, future);
        }
        data
    }

    fn track(&self, key: String, future: BoxFuture<'static, Result<Value, RouteError>>) {
        let weak: Weak<DeferredInner> = Arc::downgrade(&self.inner);
        let signal = self.inner.controller.signal();
        tokio::spawn(async move {
            tokio::select! {
                result = future => {
                    if let Some(inner) = weak.upgrade() {
                        DeferredData { inner }.settle(&key, result);
                    }
                }
                _ = signal.aborted() => {}
            }
        });
    }

    /// Move a pending entry to its terminal state. Returns false when the
    /// entry was already settled (or does not exist).
    fn settle(&self, key: &str, result: Result<Value, RouteError>) -> bool {
        let value = match result {
            Ok(value) => TrackedValue::Ready(value),
            Err(error) => TrackedValue::Error(DeferredError::Rejected(error)),
        };

        {
            let mut entries = self.lock_entries();
            match entries.get_mut(key) {
                Some(slot) if slot.is_pending() => *slot = value.clone(),
                _ => return false,
            }
        }

        match &value {
            TrackedValue::Ready(_) => metrics::record_deferred_settled("resolved"),
            _ => {
                tracing::debug!(key = %key, "Deferred value rejected");
                metrics::record_deferred_settled("rejected");
            }
        }
        self.notify(vec![DeferredEvent {
            key: key.to_string(),
            value,
        }]);
        true
    }

    fn notify(&self, events: Vec<DeferredEvent>) {
        if events.is_empty() {
            return;
        }
        self.inner.version.send_modify(|version| *version += 1);
        for event in events {
            self.inner.events.enqueue(event);
        }
        self.inner.events.flush();
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, TrackedValue>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Abort: every still-pending entry becomes `Error(Aborted)` now.
    pub fn cancel(&self) {
        self.inner.controller.abort();
        let events: Vec<DeferredEvent> = {
            let mut entries = self.lock_entries();
            self.inner
                .keys
                .iter()
                .filter_map(|key| {
                    let slot = entries.get_mut(key)?;
                    if !slot.is_pending() {
                        return None;
                    }
                    *slot = TrackedValue::Error(DeferredError::Aborted);
                    Some(DeferredEvent {
                        key: key.clone(),
                        value: slot.clone(),
                    })
                })
                .collect()
        };
        if !events.is_empty() {
            tracing::debug!(aborted = events.len(), "Deferred data cancelled");
            for _ in &events {
                metrics::record_deferred_settled("aborted");
            }
        }
        self.notify(events);
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.controller.is_aborted()
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> &[String] {
        &self.inner.keys
    }

    pub fn get(&self, key: &str) -> Option<TrackedValue> {
        self.lock_entries().get(key).cloned()
    }

    pub fn pending_keys(&self) -> Vec<String> {
        let entries = self.lock_entries();
        self.inner
            .keys
            .iter()
            .filter(|key| entries.get(*key).is_some_and(TrackedValue::is_pending))
            .cloned()
            .collect()
    }

    /// True once no entry is pending.
    pub fn is_settled(&self) -> bool {
        self.lock_entries().values().all(|v| !v.is_pending())
    }

    /// Every entry that currently has a value.
    pub fn ready_data(&self) -> Map<String, Value> {
        let entries = self.lock_entries();
        self.inner
            .keys
            .iter()
            .filter_map(|key| match entries.get(key) {
                Some(TrackedValue::Ready(value)) => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Wait for one entry to settle.
    pub async fn resolve(&self, key: &str) -> Result<Value, DeferredError> {
        let mut rx = self.inner.version.subscribe();
        loop {
            match self.get(key) {
                None => return Err(DeferredError::UnknownKey(key.to_string())),
                Some(TrackedValue::Ready(value)) => return Ok(value),
                Some(TrackedValue::Error(error)) => return Err(error),
                Some(TrackedValue::Pending) => {
                    // the sender lives in `self.inner`, so it cannot close here
                    let _ = rx.changed().await;
                }
            }
        }
    }

    /// Wait until every entry is settled. Returns true if the container was
    /// aborted along the way.
    pub async fn settled(&self) -> bool {
        let mut rx = self.inner.version.subscribe();
        while !self.is_settled() {
            let _ = rx.changed().await;
        }
        self.is_aborted()
    }

    /// Observe settlements. Entries already settled are not replayed.
    pub fn subscribe(
        &self,
        listener: impl Fn(&DeferredEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(listener)
    }

    /// True when both handles point at the same container.
    pub fn ptr_eq(&self, other: &DeferredData) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for DeferredData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.lock_entries();
        let mut map = f.debug_map();
        for key in &self.inner.keys {
            map.entry(key, &entries.get(key));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_critical_entries_are_readable_immediately() {
        let (_tx, rx) = oneshot::channel::<Value>();
        let data = DeferredData::builder()
            .critical("critical", "now")
            .lazy("lazy", async move { rx.await.map_err(|e| RouteError::msg(e.to_string())) })
            .build();

        assert_eq!(data.get("critical"), Some(TrackedValue::Ready(json!("now"))));
        assert_eq!(data.get("lazy"), Some(TrackedValue::Pending));
        assert_eq!(data.get("missing"), None);
        assert_eq!(data.pending_keys(), vec!["lazy".to_string()]);
        assert!(!data.is_settled());
        assert_eq!(data.ready_data().get("critical"), Some(&json!("now")));
    }

    #[tokio::test]
    async fn test_lazy_entry_resolves_and_notifies() {
        let (tx, rx) = oneshot::channel::<Value>();
        let data = DeferredData::builder()
            .lazy("lazy", async move { rx.await.map_err(|e| RouteError::msg(e.to_string())) })
            .build();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = data.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        tx.send(json!(7)).unwrap();
        let value = tokio::time::timeout(Duration::from_secs(1), data.resolve("lazy"))
            .await
            .unwrap();
        assert_eq!(value, Ok(json!(7)));
        assert!(data.is_settled());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![DeferredEvent {
                key: "lazy".into(),
                value: TrackedValue::Ready(json!(7))
            }]
        );
    }

    #[tokio::test]
    async fn test_rejection_is_scoped_to_its_key() {
        let data = DeferredData::builder()
            .critical("ok", 1)
            .lazy("boom", async { Err(RouteError::msg("Kaboom!")) })
            .lazy("fine", async { Ok(json!("yes")) })
            .build();

        assert!(!tokio::time::timeout(Duration::from_secs(1), data.settled())
            .await
            .unwrap());
        assert_eq!(
            data.get("boom"),
            Some(TrackedValue::Error(DeferredError::Rejected(RouteError::msg("Kaboom!"))))
        );
        assert_eq!(data.get("fine"), Some(TrackedValue::Ready(json!("yes"))));
        assert_eq!(data.get("ok"), Some(TrackedValue::Ready(json!(1))));
    }

    #[tokio::test]
    async fn test_settlement_is_idempotent() {
        let (_tx, rx) = oneshot::channel::<Value>();
        let data = DeferredData::builder()
            .lazy("lazy", async move { rx.await.map_err(|e| RouteError::msg(e.to_string())) })
            .build();

        assert!(data.settle("lazy", Ok(json!("first"))));
        assert!(!data.settle("lazy", Ok(json!("second"))));
        assert!(!data.settle("lazy", Err(RouteError::msg("late"))));
        assert_eq!(data.get("lazy"), Some(TrackedValue::Ready(json!("first"))));
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_entries_only() {
        let (_tx, rx) = oneshot::channel::<Value>();
        let data = DeferredData::builder()
            .critical("critical", true)
            .lazy("lazy", async move { rx.await.map_err(|e| RouteError::msg(e.to_string())) })
            .build();

        let waiter = tokio::spawn({
            let data = data.clone();
            async move { data.resolve("lazy").await }
        });
        tokio::task::yield_now().await;

        data.cancel();
        assert!(data.is_aborted());
        assert_eq!(data.get("critical"), Some(TrackedValue::Ready(json!(true))));
        assert_eq!(
            data.get("lazy"),
            Some(TrackedValue::Error(DeferredError::Aborted))
        );
        let resolved = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved, Err(DeferredError::Aborted));
        assert!(!data.settle("lazy", Ok(json!("too late"))));
        assert!(data.settled().await);
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let data = DeferredData::builder().critical("a", 1).build();
        assert_eq!(
            data.resolve("b").await,
            Err(DeferredError::UnknownKey("b".into()))
        );
        assert!(data.is_settled());
    }
}
