//! Services: validation, upsert, and tenant/customer registration.

mod tenancy;
mod upsert;
mod validation;
pub use tenancy::TenancyService;
pub use upsert::{UpsertService, MAX_UPSERT_ATTEMPTS};
pub use validation::{RequestValidator, MAX_TENANT_ID_LEN};
