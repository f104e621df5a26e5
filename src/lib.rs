//! Tenancy SDK: per-tenant logical databases on one shared backend connection, with
//! lazily registered models and idempotent tenant/customer registration.

pub mod config;
pub mod deadline;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod model;
pub mod registry;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod state;
pub mod store;

pub use config::TenancyConfig;
pub use deadline::Deadline;
pub use error::{AppError, ConfigError};
pub use model::{Customer, Entity, Fields, Record, Tenant, ROOT_DATABASE};
pub use registry::{database_name, ConnectionManager, Database, ModelHandle, ModelRegistry, TenantDatabaseRegistry};
pub use routes::{common_routes, common_routes_with_ready, tenancy_routes};
pub use schema::{FieldDescriptor, FieldKind, SchemaDescriptor};
pub use service::{RequestValidator, TenancyService, UpsertService};
pub use state::AppState;
pub use store::{Backend, BackendStats, Connection, MemoryBackend, PostgresBackend};
