//! Cooperative cancellation for in-flight transitions.
//!
//! An [`AbortController`] is created per navigation, fetcher call or
//! deferred container. Loader and action bodies receive the matching
//! [`AbortSignal`] and may check it or await it; nothing is forcibly
//! terminated.

use tokio::sync::watch;

/// Owner side of an abort signal.
#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<bool>,
}

impl AbortController {
    /// Create a new, not yet aborted, controller.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Hand out a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Abort. Idempotent.
    pub fn abort(&self) {
        self.tx.send_if_modified(|aborted| {
            if *aborted {
                false
            } else {
                *aborted = true;
                true
            }
        });
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of an abort signal, handed to loaders and actions.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        AbortController::new().signal()
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the owning controller aborts.
    ///
    /// If the controller is dropped without aborting, this future never
    /// resolves.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_observes_abort() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.is_aborted());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });

        controller.abort();
        controller.abort();
        assert!(signal.is_aborted());
        assert!(controller.is_aborted());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("aborted() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_controller_never_fires() {
        let signal = AbortController::new().signal();
        let res = tokio::time::timeout(Duration::from_millis(20), signal.aborted()).await;
        assert!(res.is_err());
        assert!(!signal.is_aborted());
    }
}
