//! Shared application state for all routes.

use crate::service::TenancyService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Process-wide registry; built once at startup.
    pub tenancy: Arc<TenancyService>,
}

impl AppState {
    pub fn new(tenancy: TenancyService) -> Self {
        AppState {
            tenancy: Arc::new(tenancy),
        }
    }
}
