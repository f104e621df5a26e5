//! Tenant and customer registration over the shared resource caches.

use crate::config::TenancyConfig;
use crate::deadline::Deadline;
use crate::error::AppError;
use crate::model::{Customer, Entity, Tenant};
use crate::registry::{ConnectionManager, ModelHandle, ModelRegistry, TenantDatabaseRegistry};
use crate::service::{RequestValidator, UpsertService};
use crate::store::{Backend, PostgresBackend};
use std::sync::Arc;

/// Construct once at startup and share; every cache it owns lives as long as it does.
pub struct TenancyService {
    connections: Arc<ConnectionManager>,
    databases: TenantDatabaseRegistry,
    models: ModelRegistry,
}

impl TenancyService {
    pub fn new(config: &TenancyConfig, backend: Arc<dyn Backend>) -> Self {
        let connections = Arc::new(ConnectionManager::new(config.database_url.clone(), backend));
        TenancyService {
            databases: TenantDatabaseRegistry::new(connections.clone()),
            connections,
            models: ModelRegistry::new(),
        }
    }

    /// Service backed by PostgreSQL at `config.database_url`.
    pub fn postgres(config: &TenancyConfig) -> Self {
        Self::new(config, Arc::new(PostgresBackend::new()))
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn databases(&self) -> &TenantDatabaseRegistry {
        &self.databases
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Create the tenant record, or refresh it if it exists.
    pub async fn register_tenant(&self, tenant_id: &str, deadline: &Deadline) -> Result<Tenant, AppError> {
        RequestValidator::tenant_id(tenant_id)?;
        let model = self.tenant_model(deadline).await?;
        let tenant: Tenant =
            UpsertService::upsert_entity(&model, tenant_id, &Tenant::registration_fields(tenant_id), deadline).await?;
        tracing::info!(tenant_id, "tenant registered");
        Ok(tenant)
    }

    pub async fn find_tenant(&self, tenant_id: &str, deadline: &Deadline) -> Result<Option<Tenant>, AppError> {
        RequestValidator::tenant_id(tenant_id)?;
        let model = self.tenant_model(deadline).await?;
        let record = deadline.run("find tenant", model.find_one(tenant_id)).await?;
        record.as_ref().map(Tenant::from_record).transpose()
    }

    /// Create or refresh a customer under a registered tenant. An unregistered tenant is
    /// [`AppError::NotFound`] and nothing is written, not even the tenant's database.
    pub async fn register_customer(
        &self,
        tenant_id: &str,
        customer_name: &str,
        deadline: &Deadline,
    ) -> Result<Customer, AppError> {
        RequestValidator::tenant_id(tenant_id)?;
        RequestValidator::customer_name(customer_name)?;
        self.require_tenant(tenant_id, deadline).await?;
        let model = self.customer_model(tenant_id, deadline).await?;
        let customer: Customer = UpsertService::upsert_entity(
            &model,
            customer_name,
            &Customer::registration_fields(customer_name),
            deadline,
        )
        .await?;
        tracing::info!(tenant_id, customer_name, "customer registered");
        Ok(customer)
    }

    /// Customers of one tenant ordered by name.
    pub async fn list_customers(&self, tenant_id: &str, deadline: &Deadline) -> Result<Vec<Customer>, AppError> {
        self.require_tenant(tenant_id, deadline).await?;
        let model = self.customer_model(tenant_id, deadline).await?;
        let records = deadline.run("list customers", model.find_all()).await?;
        records.iter().map(Customer::from_record).collect()
    }

    /// Resolve the shared connection and check it answers.
    pub async fn ping(&self, deadline: &Deadline) -> Result<(), AppError> {
        let connection = self.connections.get_connection(deadline).await?;
        deadline.run("ping", connection.ping()).await
    }

    async fn require_tenant(&self, tenant_id: &str, deadline: &Deadline) -> Result<Tenant, AppError> {
        self.find_tenant(tenant_id, deadline)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tenant '{}' is not registered", tenant_id)))
    }

    async fn tenant_model(&self, deadline: &Deadline) -> Result<Arc<ModelHandle>, AppError> {
        let root = self.databases.get_root_database(deadline).await?;
        let schema = Tenant::schema();
        self.models.get_model(&root, &schema.name, schema, deadline).await
    }

    async fn customer_model(&self, tenant_id: &str, deadline: &Deadline) -> Result<Arc<ModelHandle>, AppError> {
        let db = self.databases.get_tenant_database(tenant_id, deadline).await?;
        let schema = Customer::schema();
        self.models.get_model(&db, &schema.name, schema, deadline).await
    }
}
