//! Tenant and customer registration handlers.

use crate::deadline::Deadline;
use crate::error::AppError;
use crate::extractors::TenantId;
use crate::response::{success_many, success_one_ok};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use std::time::Duration;

/// Budget for one request's backend work.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
pub struct CustomerQuery {
    pub customer: Option<String>,
}

/// GET /tenant?tenantId=: register (or refresh) a tenant.
pub async fn register_tenant(
    tenant_id: TenantId,
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let deadline = Deadline::after(REQUEST_DEADLINE);
    let tenant = state
        .tenancy
        .register_tenant(&tenant_id.into_inner(), &deadline)
        .await?;
    Ok(success_one_ok(tenant))
}

/// GET /customer?tenantId=&customer=: register a customer under a registered tenant.
pub async fn register_customer(
    tenant_id: TenantId,
    State(state): State<AppState>,
    Query(q): Query<CustomerQuery>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let deadline = Deadline::after(REQUEST_DEADLINE);
    let customer_name = q.customer.unwrap_or_default();
    let customer = state
        .tenancy
        .register_customer(&tenant_id.into_inner(), &customer_name, &deadline)
        .await?;
    Ok(success_one_ok(customer))
}

/// GET /tenants/:tenant_id/customers: customers of one tenant.
pub async fn list_customers(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let deadline = Deadline::after(REQUEST_DEADLINE);
    let customers = state.tenancy.list_customers(&tenant_id, &deadline).await?;
    Ok(success_many(customers))
}
