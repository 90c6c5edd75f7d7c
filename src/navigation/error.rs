//! Router and route-level error types.
//!
//! Two families:
//! - [`RouteError`]: produced by application loaders/actions (or
//!   synthesised for 404/405) and stored in router state at a boundary
//! - [`RouterError`]: returned from router operations themselves

use hyper::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::routing::RouteTreeError;

/// An HTTP-shaped error, e.g. the synthetic 404 for an unmatched location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub status_text: String,
    pub data: Value,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, data: impl Into<Value>) -> Self {
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            data: data.into(),
        }
    }

    pub fn not_found(pathname: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("No route matches URL \"{pathname}\""),
        )
    }

    pub fn method_not_allowed(method: &str, pathname: &str, route_id: &str) -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!(
                "You made a {method} request to \"{pathname}\" but did not provide an \
                 action for route \"{route_id}\", so there is no way to handle the request."
            ),
        )
    }
}

/// A redirect directive returned or thrown by a loader/action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub location: String,
    pub status: u16,
}

impl Redirect {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            status: StatusCode::FOUND.as_u16(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status.as_u16();
        self
    }
}

/// Error raised by a loader or action.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    /// Plain application error.
    #[error("{0}")]
    Message(String),

    /// Thrown HTTP-shaped response.
    #[error("{} {}", .0.status, .0.status_text)]
    Response(ErrorResponse),

    /// Thrown redirect. Not a failure: the router consumes it and navigates.
    #[error("redirect to {}", .0.location)]
    Redirect(Redirect),
}

impl RouteError {
    pub fn msg(message: impl Into<String>) -> Self {
        RouteError::Message(message.into())
    }

    /// True for an [`ErrorResponse`], the counterpart of a route error response
    /// check in the rendering layer.
    pub fn is_error_response(&self) -> bool {
        matches!(self, RouteError::Response(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RouteError::Response(response) => Some(response.status),
            RouteError::Redirect(redirect) => Some(redirect.status),
            RouteError::Message(_) => None,
        }
    }
}

impl From<ErrorResponse> for RouteError {
    fn from(response: ErrorResponse) -> Self {
        RouteError::Response(response)
    }
}

impl From<serde_json::Error> for RouteError {
    fn from(error: serde_json::Error) -> Self {
        RouteError::Message(error.to_string())
    }
}

/// Errors returned by router operations.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("router has been disposed")]
    Disposed,

    #[error("too many redirects, last target was {location}")]
    RedirectLoop { location: String },

    #[error(transparent)]
    RouteTree(#[from] RouteTreeError),
}

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_text() {
        let response = ErrorResponse::not_found("/nope");
        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
        assert_eq!(RouteError::from(response).to_string(), "404 Not Found");
    }

    #[test]
    fn test_route_error_status() {
        assert_eq!(RouteError::msg("boom").status(), None);
        assert_eq!(RouteError::Redirect(Redirect::new("/login")).status(), Some(302));
        let moved = Redirect::new("/new").with_status(StatusCode::MOVED_PERMANENTLY);
        assert_eq!(moved.status, 301);
        assert!(RouteError::from(ErrorResponse::new(StatusCode::GONE, Value::Null)).is_error_response());
    }
}
