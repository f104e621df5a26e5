mod common;
mod tenancy;

pub use common::{common_routes, common_routes_with_ready};
pub use tenancy::tenancy_routes;
