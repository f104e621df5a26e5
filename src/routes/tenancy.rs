//! Registration routes, mirroring the query-string API callers already use.

use crate::handlers::tenancy::{list_customers, register_customer, register_tenant};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Requests carry everything in the query string; bodies are never needed.
const MAX_BODY_BYTES: usize = 16 * 1024;

pub fn tenancy_routes(state: AppState) -> Router {
    Router::new()
        .route("/tenant", get(register_tenant))
        .route("/customer", get(register_customer))
        .route("/tenants/:tenant_id/customers", get(list_customers))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
