//! Subscription bus.
//!
//! # Data Flow
//! ```text
//! commit (under the router's commit lock)
//!     → enqueue(snapshot)
//! commit lock released
//!     → flush(): deliver queued snapshots, oldest first, to every listener
//! ```
//!
//! # Design Decisions
//! - Delivery is synchronous and in commit order
//! - A listener may publish again (e.g. navigate from a callback); the new
//!   snapshot is queued and delivered after the current one, never nested
//! - Listeners are copied out before delivery so they can subscribe or
//!   unsubscribe while being called
//! - A panicking listener loses the value being delivered; the bus keeps
//!   delivering afterwards

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Fan-out of values to synchronous listeners.
pub struct SubscriptionBus<T> {
    inner: Arc<BusInner<T>>,
}

struct BusInner<T> {
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: AtomicU64,
    delivery: Mutex<Delivery<T>>,
}

struct Delivery<T> {
    queue: VecDeque<T>,
    delivering: bool,
}

impl<T: Clone + Send + 'static> SubscriptionBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                delivery: Mutex::new(Delivery {
                    queue: VecDeque::new(),
                    delivering: false,
                }),
            }),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));

        let weak: Weak<BusInner<T>> = Arc::downgrade(&self.inner);
        Subscription::from_fn(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Queue a value without delivering it yet.
    pub fn enqueue(&self, value: T) {
        self.inner
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .push_back(value);
    }

    /// Deliver everything queued so far. If another caller is already
    /// delivering, it picks up the queued values instead.
    pub fn flush(&self) {
        {
            let mut delivery = self
                .inner
                .delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if delivery.delivering {
                return;
            }
            delivery.delivering = true;
        }
        let _unwind = UnwindGuard(&self.inner);

        loop {
            let next = {
                let mut delivery = self
                    .inner
                    .delivery
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                match delivery.queue.pop_front() {
                    Some(value) => value,
                    None => {
                        delivery.delivering = false;
                        return;
                    }
                }
            };

            let listeners: Vec<Listener<T>> = self
                .inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();
            for listener in listeners {
                listener(&next);
            }
        }
    }

    pub fn publish(&self, value: T) {
        self.enqueue(value);
        self.flush();
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every listener and anything still queued.
    pub fn clear(&self) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .clear();
    }
}

/// Releases delivery if a listener panics, so later flushes still deliver.
struct UnwindGuard<'a, T>(&'a BusInner<T>);

impl<T> Drop for UnwindGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0
                .delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .delivering = false;
        }
    }
}

impl<T: Clone + Send + 'static> Default for SubscriptionBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SubscriptionBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionBus").finish_non_exhaustive()
    }
}

/// Unsubscribes when dropped.
#[must_use]
pub struct Subscription(Option<Box<dyn FnOnce() + Send>>);

impl Subscription {
    pub fn empty() -> Self {
        Subscription(None)
    }

    pub fn from_fn(f: impl FnOnce() + Send + 'static) -> Self {
        Subscription(Some(Box::new(f)))
    }

    /// Unsubscribe now.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Subscription")
            .field(&self.0.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(&u32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v: &u32| sink.lock().unwrap().push(*v))
    }

    #[test]
    fn test_delivers_in_publish_order() {
        let bus = SubscriptionBus::new();
        let (seen, listener) = recorder();
        let _sub = bus.subscribe(listener);

        bus.publish(1);
        bus.enqueue(2);
        bus.enqueue(3);
        bus.flush();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = SubscriptionBus::new();
        let (seen, listener) = recorder();
        let sub = bus.subscribe(listener);
        assert_eq!(bus.listener_count(), 1);

        bus.publish(1);
        drop(sub);
        bus.publish(2);

        assert_eq!(bus.listener_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_reentrant_publish_is_queued_not_nested() {
        let bus = Arc::new(SubscriptionBus::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        let first = order.clone();
        let _a = bus.subscribe(move |v: &u32| {
            first.lock().unwrap().push(("a", *v));
            if *v == 1 {
                inner_bus.publish(2);
            }
        });
        let second = order.clone();
        let _b = bus.subscribe(move |v: &u32| second.lock().unwrap().push(("b", *v)));

        bus.publish(1);

        assert_eq!(
            *order.lock().unwrap(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn test_panicking_listener_does_not_stall_delivery() {
        let bus = SubscriptionBus::new();
        let _bad = bus.subscribe(|v: &u32| {
            if *v == 1 {
                panic!("listener failed");
            }
        });
        let (seen, listener) = recorder();
        let _good = bus.subscribe(listener);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| bus.publish(1)));
        assert!(result.is_err());

        bus.publish(2);
        bus.publish(3);
        assert_eq!(*seen.lock().unwrap(), vec![2, 3]);
    }
}
