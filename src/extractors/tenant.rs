//! Extract the tenant id from the `tenantId` query parameter or the `X-Tenant-ID` header.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;

/// Header consulted when the query string carries no tenant id.
pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantQuery {
    tenant_id: Option<String>,
}

/// Tenant id of the request, if any. The query parameter wins over the header.
#[derive(Clone, Debug)]
pub struct TenantId(pub Option<String>);

impl TenantId {
    /// The id, or an empty string for validation to reject.
    pub fn into_inner(self) -> String {
        self.0.unwrap_or_default()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_query = Query::<TenantQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.tenant_id)
            .and_then(|s| non_empty(&s));
        let value = from_query.or_else(|| {
            parts
                .headers
                .get(TENANT_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(non_empty)
        });
        Ok(TenantId(value))
    }
}
