#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use module_access::clock::FixedClock;
use module_access::config::Config;
use module_access::store::AppState;
use module_access::store::bootstrap;
use module_access::store::memory::MemoryStore;

pub const TI: &str = "ti@empresa.com";
pub const FINANCEIRO: &str = "financeiro@empresa.com";
pub const RH: &str = "rh@empresa.com";
pub const OPERACOES: &str = "operacoes@empresa.com";

pub const JUSTIFICATION: &str = "Needed for the monthly closing routine";

/// Header the gateway would set. Matches `Config::for_memory`.
const IDENTITY_HEADER: &str = "x-authenticated-email";

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()
}

/// A router over a seeded in-memory store and a clock the test controls.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
}

/// Build a test `AppState` over a fresh in-memory store.
///
/// - Seeds the demo catalog (modules and users)
/// - Pins the clock to [`epoch`]
pub async fn test_state() -> (AppState, MemoryStore, Arc<FixedClock>) {
    let store = MemoryStore::new();
    bootstrap::seed_memory(&store).await;

    let clock = Arc::new(FixedClock::new(epoch()));
    let state = AppState::new(Arc::new(store.clone()), clock.clone(), Config::for_memory());
    (state, store, clock)
}

/// Build the full API router with the given state.
pub fn test_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(module_access::api::router())
        .with_state(state)
}

pub async fn test_app() -> TestApp {
    let (state, store, clock) = test_state().await;
    TestApp {
        router: test_router(state),
        store,
        clock,
    }
}

/// Look up a catalog module id by name through the API.
pub async fn module_id(app: &Router, name: &str) -> Uuid {
    let (status, body) = get_json(app, TI, "/api/modules").await;
    assert_eq!(status, StatusCode::OK, "list modules failed: {body}");
    let id = body
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["name"] == name)
        .unwrap_or_else(|| panic!("module {name} not in catalog"))["id"]
        .as_str()
        .unwrap()
        .to_owned();
    Uuid::parse_str(&id).unwrap()
}

/// Submit a request for the named modules. Returns `(status, body)`.
pub async fn create_request(app: &Router, email: &str, modules: &[&str]) -> (StatusCode, Value) {
    let mut ids = Vec::new();
    for name in modules {
        ids.push(module_id(app, name).await);
    }
    post_json(
        app,
        email,
        "/api/requests",
        serde_json::json!({
            "module_ids": ids,
            "justification": JUSTIFICATION,
            "urgent": false,
        }),
    )
    .await
}

/// Names of the modules on the request, as returned by the detail endpoint.
pub async fn request_module_names(app: &Router, email: &str, id: &str) -> Vec<String> {
    let (status, body) = get_json(app, email, &format!("/api/requests/{id}")).await;
    assert_eq!(status, StatusCode::OK, "detail failed: {body}");
    body["modules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap().to_owned())
        .collect()
}

/// Send a GET request as `email`. An empty email sends no identity.
pub async fn get_json(app: &Router, email: &str, path: &str) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(path);
    if !email.is_empty() {
        builder = builder.header(IDENTITY_HEADER, email);
    }
    let req = builder.body(Body::empty()).unwrap();
    send(app, req).await
}

/// Send a POST request as `email` with a JSON body.
pub async fn post_json(app: &Router, email: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, "POST", email, path, &body).await
}

/// Send a PUT request as `email` with a JSON body.
pub async fn put_json(app: &Router, email: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, "PUT", email, path, &body).await
}

async fn send_json(
    app: &Router,
    method: &str,
    email: &str,
    path: &str,
    body: &Value,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("Content-Type", "application/json");
    if !email.is_empty() {
        builder = builder.header(IDENTITY_HEADER, email);
    }
    let req = builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap();
    send(app, req).await
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

/// Extract JSON body from a response.
async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
