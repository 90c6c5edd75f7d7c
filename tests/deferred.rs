//! Deferred loader data through the router.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use data_router::deferred::{DeferredData, DeferredError, TrackedValue};
use data_router::navigation::{defer, json, loader_fn, LoaderValue, NavigateOptions, NavigationOutcome};
use data_router::routing::{PathRoute, RouteTree};
use data_router::{Router, RouterOptions};

mod common;
use common::{eventually, Gate, TodoApp};

#[tokio::test]
async fn test_commit_does_not_wait_for_lazy_values() {
    let app = TodoApp::new();
    let router = app.router("/").await;

    let outcome = router
        .navigate("/deferred", NavigateOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, NavigationOutcome::Committed);
    assert!(!router.is_busy());

    let state = router.snapshot();
    let data = state
        .loader_data_for("deferred")
        .and_then(LoaderValue::as_deferred)
        .cloned()
        .expect("deferred loader data");
    assert_eq!(data.get("critical"), Some(TrackedValue::Ready(json!("ready"))));
    assert_eq!(data.get("lazy"), Some(TrackedValue::Pending));
    assert_eq!(data.pending_keys(), vec!["lazy".to_string()]);

    app.gate.open();
    assert_eq!(data.resolve("lazy").await, Ok(json!("arrived")));
    assert!(data.is_settled());
    // settling never produces a router commit
    assert!(std::sync::Arc::ptr_eq(&state, &router.snapshot()));
}

#[tokio::test]
async fn test_leaving_the_route_cancels_pending_values() {
    let app = TodoApp::new();
    let router = app.router("/deferred").await;
    let data = router
        .snapshot()
        .loader_data_for("deferred")
        .and_then(LoaderValue::as_deferred)
        .cloned()
        .expect("deferred loader data");

    router.navigate("/todos", NavigateOptions::default()).await.unwrap();

    assert!(eventually(|| data.is_aborted()).await);
    assert_eq!(
        data.get("lazy"),
        Some(TrackedValue::Error(DeferredError::Aborted))
    );
    assert_eq!(data.get("critical"), Some(TrackedValue::Ready(json!("ready"))));

    // a late arrival does not resurrect the entry
    app.gate.open();
    tokio::task::yield_now().await;
    assert_eq!(data.resolve("lazy").await, Err(DeferredError::Aborted));
}

#[tokio::test]
async fn test_revalidation_replaces_the_container() {
    let app = TodoApp::new();
    let router = app.router("/deferred").await;
    let first = router
        .snapshot()
        .loader_data_for("deferred")
        .and_then(LoaderValue::as_deferred)
        .cloned()
        .expect("deferred loader data");

    router.revalidate().await.unwrap();
    let second = router
        .snapshot()
        .loader_data_for("deferred")
        .and_then(LoaderValue::as_deferred)
        .cloned()
        .expect("deferred loader data");

    assert!(!first.ptr_eq(&second));
    assert!(first.is_aborted());
    assert!(!second.is_aborted());
    router.dispose();
    assert!(second.is_aborted());
}

#[tokio::test]
async fn test_superseded_navigation_cancels_its_containers() {
    let gate = Gate::new();
    let created: Arc<Mutex<Option<DeferredData>>> = Arc::default();

    let shell_loader = loader_fn({
        let gate = gate.clone();
        move |_| {
            let gate = gate.clone();
            async move {
                gate.wait().await;
                json("shell")
            }
        }
    });
    let feed_loader = loader_fn({
        let created = created.clone();
        move |_| {
            let data = DeferredData::builder()
                .critical("head", "first page")
                .lazy("rest", async {
                    std::future::pending::<()>().await;
                    Ok(Value::Null)
                })
                .build();
            *created.lock().unwrap() = Some(data.clone());
            async move { defer(data) }
        }
    });
    let tree = RouteTree::new(vec![PathRoute::new("/")
        .id("root")
        .child(
            PathRoute::new("shell")
                .id("shell")
                .loader(shell_loader)
                .child(PathRoute::new("feed").id("feed").loader(feed_loader)),
        )
        .child(PathRoute::new("other").id("other"))
        .into()])
    .unwrap();
    let router = Router::new(RouterOptions::new(tree).initial_entries(&["/other"]));
    router.initialize().await.unwrap();

    let feed = tokio::spawn({
        let router = router.clone();
        async move { router.navigate("/shell/feed", NavigateOptions::default()).await }
    });
    assert!(eventually(|| created.lock().unwrap().is_some()).await);
    let data = created.lock().unwrap().clone().unwrap();
    assert!(!data.is_aborted());

    router.navigate("/other", NavigateOptions::default()).await.unwrap();
    assert_eq!(feed.await.unwrap().unwrap(), NavigationOutcome::Superseded);

    assert!(eventually(|| data.is_aborted()).await);
    assert_eq!(data.get("rest"), Some(TrackedValue::Error(DeferredError::Aborted)));
    let state = router.snapshot();
    assert_eq!(state.location.pathname, "/other");
    assert!(state.loader_data_for("feed").is_none());

    // the parent finishing later commits nothing
    gate.open();
    tokio::task::yield_now().await;
    assert!(router.snapshot().loader_data_for("shell").is_none());
}
