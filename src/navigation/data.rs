//! Loader and action contract.
//!
//! A loader or action is an async function from [`DataFunctionArgs`] to a
//! [`DataResponse`]. Returning `Err` routes the error to the nearest
//! boundary; returning or raising a redirect starts a new navigation.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper::Method;
use serde::Serialize;
use serde_json::Value;

use crate::deferred::DeferredData;
use crate::lifecycle::abort::AbortSignal;
use crate::location::FormData;
use crate::navigation::error::{Redirect, RouteError};
use crate::routing::Params;

/// Future returned by loaders and actions.
pub type DataFuture = BoxFuture<'static, Result<DataResponse, RouteError>>;

/// A route loader. Actions share the same shape.
pub type LoaderFn = Arc<dyn Fn(DataFunctionArgs) -> DataFuture + Send + Sync>;

pub type ActionFn = LoaderFn;

/// Per-route revalidation policy. Receives the default decision and may
/// override it.
pub type ShouldRevalidateFn = Arc<dyn Fn(&ShouldRevalidateArgs) -> bool + Send + Sync>;

/// Wrap an async closure as a [`LoaderFn`].
pub fn loader_fn<F, Fut>(f: F) -> LoaderFn
where
    F: Fn(DataFunctionArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DataResponse, RouteError>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// Wrap an async closure as an [`ActionFn`].
pub fn action_fn<F, Fut>(f: F) -> ActionFn
where
    F: Fn(DataFunctionArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DataResponse, RouteError>> + Send + 'static,
{
    loader_fn(f)
}

pub fn should_revalidate_fn(
    f: impl Fn(&ShouldRevalidateArgs) -> bool + Send + Sync + 'static,
) -> ShouldRevalidateFn {
    Arc::new(f)
}

/// Request-like payload handed to a loader or action.
#[derive(Debug, Clone)]
pub struct DataRequest {
    /// `pathname + search` of the target location.
    pub url: String,
    pub pathname: String,
    pub search: String,
    pub method: Method,
    /// Present for submissions only.
    pub form_data: Option<FormData>,
    /// Fires when the owning navigation or fetcher call is superseded.
    pub signal: AbortSignal,
}

impl DataRequest {
    /// Query parameters of the target URL.
    pub fn search_params(&self) -> FormData {
        FormData::from_query(&self.search)
    }
}

#[derive(Debug, Clone)]
pub struct DataFunctionArgs {
    pub params: Params,
    pub request: DataRequest,
}

/// What a loader or action produced.
#[derive(Debug, Clone)]
pub enum DataResponse {
    Data(Value),
    /// Partially available data; pending entries settle after the commit.
    Deferred(DeferredData),
    Redirect(Redirect),
}

/// Serialize `value` as loader data.
pub fn json(value: impl Serialize) -> Result<DataResponse, RouteError> {
    Ok(DataResponse::Data(serde_json::to_value(value)?))
}

/// Redirect to `location` with a 302.
pub fn redirect(location: impl Into<String>) -> Result<DataResponse, RouteError> {
    Ok(DataResponse::Redirect(Redirect::new(location)))
}

pub fn defer(data: DeferredData) -> Result<DataResponse, RouteError> {
    Ok(DataResponse::Deferred(data))
}

/// Form payload of a submission navigation or fetcher call.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub method: Method,
    pub form_data: FormData,
}

impl Submission {
    pub fn new(method: Method, form_data: FormData) -> Self {
        Self { method, form_data }
    }

    pub fn post(form_data: FormData) -> Self {
        Self::new(Method::POST, form_data)
    }

    /// GET submissions load instead of mutating.
    pub fn is_mutation(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }
}

/// Inputs of a revalidation decision for one route.
#[derive(Debug, Clone)]
pub struct ShouldRevalidateArgs {
    pub current_url: String,
    pub current_params: Params,
    pub next_url: String,
    pub next_params: Params,
    pub form_method: Option<Method>,
    pub form_data: Option<FormData>,
    /// Data returned by the action that preceded this load, if any.
    pub action_result: Option<Value>,
    pub default_should_revalidate: bool,
}
