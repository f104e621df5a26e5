use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tenancy_sdk::extractors::TENANT_ID_HEADER;
use tenancy_sdk::{
    common_routes, common_routes_with_ready, tenancy_routes, AppState, MemoryBackend, TenancyConfig, TenancyService,
};
use tower::ServiceExt;

fn app(backend: &MemoryBackend) -> Router {
    let svc = TenancyService::new(&TenancyConfig::new("mem://local/tenancy"), Arc::new(backend.clone()));
    let state = AppState::new(svc);
    Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(tenancy_routes(state))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()).await
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn register_tenant_returns_stored_tenant() {
    let app = app(&MemoryBackend::new());

    let (status, body) = get(&app, "/tenant?tenantId=42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "42");
    assert_eq!(body["data"]["name"], "42");
    assert!(body["data"]["createdAt"].is_string());
}

#[tokio::test]
async fn missing_tenant_id_is_422() {
    let app = app(&MemoryBackend::new());

    let (status, body) = get(&app, "/tenant").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn customer_for_unregistered_tenant_is_404() {
    let backend = MemoryBackend::new();
    let app = app(&backend);

    let (status, body) = get(&app, "/customer?tenantId=nobody&customer=Acme").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert_eq!(backend.stats().writes, 0);
}

#[tokio::test]
async fn customer_registration_is_idempotent_over_http() {
    let backend = MemoryBackend::new();
    let app = app(&backend);
    get(&app, "/tenant?tenantId=42").await;

    let (status, first) = get(&app, "/customer?tenantId=42&customer=Acme").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["customerName"], "Acme");

    let (_, second) = get(&app, "/customer?tenantId=42&customer=Acme").await;
    assert_eq!(second["data"]["createdAt"], first["data"]["createdAt"]);

    let (status, list) = get(&app, "/tenants/42/customers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["meta"]["count"], 1);
    assert_eq!(list["data"][0]["customerName"], "Acme");
}

#[tokio::test]
async fn tenant_id_header_is_accepted() {
    let app = app(&MemoryBackend::new());
    get(&app, "/tenant?tenantId=7").await;

    let req = Request::builder()
        .method("GET")
        .uri("/customer?customer=Globex")
        .header(TENANT_ID_HEADER, "7")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["customerName"], "Globex");
}

#[tokio::test]
async fn unreachable_backend_is_503() {
    let backend = MemoryBackend::new();
    backend.fail_next_connects(1);
    let app = app(&backend);

    let (status, body) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");

    backend.fail_next_connects(1);
    let (status, body) = get(&app, "/tenant?tenantId=42").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "connection_error");

    let (status, _) = get(&app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_and_version_need_no_state() {
    let app = common_routes();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (_, body) = get(&app, "/version").await;
    assert_eq!(body["name"], "tenancy-sdk");
}
