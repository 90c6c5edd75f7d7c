//! Timeout enforcement for loaders and actions.
//!
//! # Responsibilities
//! - Wrap a loader or action with a deadline
//! - Turn an elapsed deadline into a route error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Opt-in per route; the router itself imposes no deadline
//! - Timed-out calls fail with 504 Gateway Timeout at the nearest boundary

use std::time::Duration;

use futures_util::FutureExt;
use hyper::StatusCode;

use crate::navigation::data::LoaderFn;
use crate::navigation::error::{ErrorResponse, RouteError};

/// Error stored when a wrapped call misses its deadline.
pub fn timeout_error(pathname: &str, timeout: Duration) -> RouteError {
    RouteError::Response(ErrorResponse::new(
        StatusCode::GATEWAY_TIMEOUT,
        format!(
            "Loading \"{pathname}\" did not finish within {}ms",
            timeout.as_millis()
        ),
    ))
}

/// Wrap `inner` so it fails once `timeout` elapses. Works for actions too.
pub fn with_timeout(inner: LoaderFn, timeout: Duration) -> LoaderFn {
    std::sync::Arc::new(move |args| {
        let pathname = args.request.pathname.clone();
        let call = inner(args);
        async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        pathname = %pathname,
                        timeout_ms = timeout.as_millis() as u64,
                        "Loader timed out"
                    );
                    Err(timeout_error(&pathname, timeout))
                }
            }
        }
        .boxed()
    })
}
