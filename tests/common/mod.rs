//! Shared fixtures for integration tests: a small todos application with
//! controllable loaders.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hyper::StatusCode;
use serde_json::{json, Value};
use tokio::sync::watch;

use data_router::deferred::DeferredData;
use data_router::navigation::{
    action_fn, defer, json, loader_fn, redirect, ErrorResponse, RouteError,
};
use data_router::routing::{IndexRoute, PathRoute, RouteTree};
use data_router::{Router, RouterOptions};

/// In-memory todo list shared by loaders and actions.
#[derive(Clone, Default)]
pub struct TodoStore {
    todos: Arc<Mutex<Vec<(u64, String)>>>,
}

impl TodoStore {
    pub fn with(titles: &[&str]) -> Self {
        let store = Self::default();
        for title in titles {
            store.add(title);
        }
        store
    }

    pub fn add(&self, title: &str) -> u64 {
        let mut todos = self.todos.lock().unwrap();
        let id = todos.last().map_or(1, |(id, _)| id + 1);
        todos.push((id, title.to_string()));
        id
    }

    pub fn delete(&self, id: u64) {
        self.todos.lock().unwrap().retain(|(todo, _)| *todo != id);
    }

    pub fn get(&self, id: u64) -> Option<String> {
        self.todos
            .lock()
            .unwrap()
            .iter()
            .find(|(todo, _)| *todo == id)
            .map(|(_, title)| title.clone())
    }

    pub fn titles(&self) -> Vec<String> {
        self.todos
            .lock()
            .unwrap()
            .iter()
            .map(|(_, title)| title.clone())
            .collect()
    }
}

/// A latch loaders can wait on.
#[derive(Clone)]
pub struct Gate {
    open: Arc<watch::Sender<bool>>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            open: Arc::new(watch::channel(false).0),
        }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub async fn wait(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// Route ids in the order their loaders were called.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, route_id: &str) {
        self.0.lock().unwrap().push(route_id.to_string());
    }

    /// Drain the log, sorted: sibling loaders run concurrently.
    pub fn take(&self) -> Vec<String> {
        let mut calls = std::mem::take(&mut *self.0.lock().unwrap());
        calls.sort();
        calls
    }

    pub fn count(&self, route_id: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|id| *id == route_id).count()
    }
}

/// The todos application:
///
/// ```text
/// /                 root (loader, boundary)
///   (index)         home
///   todos           todos (loader, action, boundary; "add-when-open" waits on the gate)
///     :id           todo (loader, 404 for unknown ids)
///   deferred        deferred (critical + gated lazy value)
///   long-load       slow (loader waits on the gate)
///   broken          broken (loader fails, no own boundary)
///   redirect-loop   looping (always redirects to itself)
/// ```
pub struct TodoApp {
    pub store: TodoStore,
    pub gate: Gate,
    pub calls: CallLog,
}

impl TodoApp {
    pub fn new() -> Self {
        Self {
            store: TodoStore::with(&["Buy milk", "Walk dog"]),
            gate: Gate::new(),
            calls: CallLog::default(),
        }
    }

    pub fn tree(&self) -> RouteTree {
        let calls = self.calls.clone();
        let root_loader = loader_fn(move |_| {
            calls.record("root");
            async { json(json!({ "user": "demo" })) }
        });

        let (calls, store) = (self.calls.clone(), self.store.clone());
        let todos_loader = loader_fn(move |_| {
            calls.record("todos");
            let titles = store.titles();
            async move { json(titles) }
        });

        let (store, gate) = (self.store.clone(), self.gate.clone());
        let todos_action = action_fn(move |args| {
            let (store, gate) = (store.clone(), gate.clone());
            async move {
                let form = args.request.form_data.unwrap_or_default();
                match form.get("intent") {
                    Some("add") => {
                        let id = store.add(form.get("title").unwrap_or("untitled"));
                        json(json!({ "created": id }))
                    }
                    Some("add-when-open") => {
                        gate.wait().await;
                        let id = store.add(form.get("title").unwrap_or("untitled"));
                        json(json!({ "created": id }))
                    }
                    Some("delete") => {
                        let id = form.get("id").and_then(|id| id.parse().ok()).unwrap_or(0);
                        store.delete(id);
                        json(json!({ "deleted": id }))
                    }
                    Some("create-and-open") => {
                        let id = store.add(form.get("title").unwrap_or("untitled"));
                        redirect(format!("/todos/{id}"))
                    }
                    _ => Err(RouteError::msg("unknown intent")),
                }
            }
        });

        let (calls, store) = (self.calls.clone(), self.store.clone());
        let todo_loader = loader_fn(move |args| {
            calls.record("todo");
            let id = args.params.get("id").unwrap_or_default().to_string();
            let title = id.parse().ok().and_then(|id| store.get(id));
            async move {
                match title {
                    Some(title) => json(json!({ "id": id, "title": title })),
                    None => Err(ErrorResponse::new(
                        StatusCode::NOT_FOUND,
                        format!("Todo {id} not found"),
                    )
                    .into()),
                }
            }
        });

        let (calls, gate) = (self.calls.clone(), self.gate.clone());
        let deferred_loader = loader_fn(move |_| {
            calls.record("deferred");
            let gate = gate.clone();
            async move {
                defer(
                    DeferredData::builder()
                        .critical("critical", "ready")
                        .lazy("lazy", async move {
                            gate.wait().await;
                            Ok(Value::from("arrived"))
                        })
                        .build(),
                )
            }
        });

        let (calls, gate) = (self.calls.clone(), self.gate.clone());
        let slow_loader = loader_fn(move |_| {
            calls.record("slow");
            let gate = gate.clone();
            async move {
                gate.wait().await;
                json("slow data")
            }
        });

        let calls = self.calls.clone();
        let broken_loader = loader_fn(move |_| {
            calls.record("broken");
            async { Err(RouteError::msg("kaboom")) }
        });

        let looping_loader = loader_fn(|_| async { redirect("/redirect-loop") });

        RouteTree::new(vec![PathRoute::new("/")
            .id("root")
            .loader(root_loader)
            .error_boundary()
            .child(IndexRoute::new().id("home"))
            .child(
                PathRoute::new("todos")
                    .id("todos")
                    .loader(todos_loader)
                    .action(todos_action)
                    .error_boundary()
                    .child(PathRoute::new(":id").id("todo").loader(todo_loader)),
            )
            .child(PathRoute::new("deferred").id("deferred").loader(deferred_loader))
            .child(PathRoute::new("long-load").id("slow").loader(slow_loader))
            .child(PathRoute::new("broken").id("broken").loader(broken_loader))
            .child(
                PathRoute::new("redirect-loop")
                    .id("looping")
                    .loader(looping_loader),
            )
            .into()])
        .expect("fixture tree is valid")
    }

    /// Router at `href`, already initialized.
    pub async fn router(&self, href: &str) -> Router {
        let router = Router::new(RouterOptions::new(self.tree()).initial_entries(&[href]));
        router.initialize().await.expect("initial load");
        router
    }
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
