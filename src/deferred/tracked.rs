//! Per-entry read model of a deferred container.

use serde_json::Value;
use thiserror::Error;

use crate::navigation::error::RouteError;

/// Why a deferred entry ended without a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeferredError {
    /// The producing future failed.
    #[error("deferred value rejected: {0}")]
    Rejected(RouteError),

    /// The owning navigation was cancelled before the value arrived.
    #[error("deferred value aborted")]
    Aborted,

    #[error("no deferred value named {0:?}")]
    UnknownKey(String),
}

/// What a reader sees for one key.
///
/// `Pending` tells the rendering layer to suspend only the subtree reading
/// this key; `Error` routes to the nearest error boundary around it.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedValue {
    Ready(Value),
    Pending,
    Error(DeferredError),
}

impl TrackedValue {
    pub fn is_pending(&self) -> bool {
        matches!(self, TrackedValue::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TrackedValue::Ready(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            TrackedValue::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DeferredError> {
        match self {
            TrackedValue::Error(error) => Some(error),
            _ => None,
        }
    }
}

/// Settlement notification delivered to container subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredEvent {
    pub key: String,
    pub value: TrackedValue,
}
