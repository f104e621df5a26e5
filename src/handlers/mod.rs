//! HTTP handlers for tenant and customer registration.

pub mod tenancy;
pub use tenancy::*;
