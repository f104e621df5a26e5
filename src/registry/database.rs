use super::{ConnectionManager, SingleFlight};
use crate::deadline::Deadline;
use crate::error::AppError;
use crate::model::ROOT_DATABASE;
use crate::service::RequestValidator;
use crate::store::Connection;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Logical database name for a tenant.
pub fn database_name(tenant_id: &str) -> String {
    format!("tenant-{}", tenant_id)
}

/// A logical database on the shared connection.
pub struct Database {
    name: String,
    connection: Arc<dyn Connection>,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("name", &self.name).finish()
    }
}

/// Tenant id to logical database, opened once per tenant and cached for the life of
/// the process.
pub struct TenantDatabaseRegistry {
    connections: Arc<ConnectionManager>,
    root: OnceCell<Arc<Database>>,
    tenants: SingleFlight<String, Arc<Database>>,
}

impl TenantDatabaseRegistry {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        TenantDatabaseRegistry {
            connections,
            root: OnceCell::new(),
            tenants: SingleFlight::new(),
        }
    }

    /// The root database holding the tenant collection.
    pub async fn get_root_database(&self, deadline: &Deadline) -> Result<Arc<Database>, AppError> {
        if let Some(db) = self.root.get() {
            return Ok(db.clone());
        }
        deadline
            .run("open root database", async {
                self.root
                    .get_or_try_init(|| self.open(ROOT_DATABASE.to_string(), deadline))
                    .await
                    .cloned()
            })
            .await
    }

    pub async fn get_tenant_database(&self, tenant_id: &str, deadline: &Deadline) -> Result<Arc<Database>, AppError> {
        RequestValidator::tenant_id(tenant_id)?;
        let key = tenant_id.to_string();
        if let Some(db) = self.tenants.get(&key)? {
            return Ok(db);
        }
        deadline
            .run(
                "open tenant database",
                self.tenants
                    .get_or_try_init(&key, || self.open(database_name(tenant_id), deadline)),
            )
            .await
    }

    /// Number of tenant databases opened so far.
    pub fn tenant_count(&self) -> Result<usize, AppError> {
        self.tenants.len()
    }

    async fn open(&self, name: String, deadline: &Deadline) -> Result<Arc<Database>, AppError> {
        let connection = self.connections.get_connection(deadline).await?;
        connection.open_database(&name).await?;
        tracing::info!(database = %name, "opened logical database");
        Ok(Arc::new(Database { name, connection }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MAX_TENANT_ID_LEN;
    use crate::store::MemoryBackend;
    use std::time::Duration;

    fn registry(backend: &MemoryBackend) -> Arc<TenantDatabaseRegistry> {
        let connections = Arc::new(ConnectionManager::new("mem://local/test", Arc::new(backend.clone())));
        Arc::new(TenantDatabaseRegistry::new(connections))
    }

    #[test]
    fn name_is_derived_from_tenant_id() {
        assert_eq!(database_name("42"), "tenant-42");
        assert_eq!(database_name("42"), database_name("42"));
    }

    #[tokio::test]
    async fn concurrent_first_calls_open_one_database() {
        let backend = MemoryBackend::with_latency(Duration::from_millis(10));
        let registry = registry(&backend);

        let mut handles = Vec::new();
        for _ in 0..25 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get_tenant_database("acme", &Deadline::none()).await
            }));
        }
        let mut dbs = Vec::new();
        for h in handles {
            dbs.push(h.await.unwrap().unwrap());
        }

        assert!(dbs.iter().all(|db| Arc::ptr_eq(db, &dbs[0])));
        assert_eq!(dbs[0].name(), "tenant-acme");
        let stats = backend.stats();
        assert_eq!(stats.connects, 1);
        assert_eq!(stats.databases_opened, 1);
        assert_eq!(registry.tenant_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn tenants_get_distinct_databases_on_one_connection() {
        let backend = MemoryBackend::new();
        let registry = registry(&backend);
        let a = registry.get_tenant_database("a", &Deadline::none()).await.unwrap();
        let b = registry.get_tenant_database("b", &Deadline::none()).await.unwrap();
        let root = registry.get_root_database(&Deadline::none()).await.unwrap();

        assert_eq!(a.name(), "tenant-a");
        assert_eq!(b.name(), "tenant-b");
        assert_eq!(root.name(), ROOT_DATABASE);
        assert!(Arc::ptr_eq(a.connection(), b.connection()));
        assert_eq!(backend.stats().connects, 1);
        assert_eq!(backend.stats().databases_opened, 3);
    }

    #[tokio::test]
    async fn invalid_tenant_id_is_rejected_before_connecting() {
        let backend = MemoryBackend::new();
        let registry = registry(&backend);
        let too_long = "x".repeat(MAX_TENANT_ID_LEN + 1);
        for bad in ["", "a\0b", too_long.as_str()] {
            let err = registry.get_tenant_database(bad, &Deadline::none()).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{bad:?}");
        }
        assert_eq!(backend.stats().connects, 0);
    }

    #[tokio::test]
    async fn any_non_empty_string_names_a_tenant_database() {
        let backend = MemoryBackend::new();
        let registry = registry(&backend);
        for id in ["acme.corp", "_x", "café", "tenant 1"] {
            let db = registry.get_tenant_database(id, &Deadline::none()).await.unwrap();
            assert_eq!(db.name(), format!("tenant-{}", id));
        }
        assert_eq!(registry.tenant_count().unwrap(), 4);
    }

    #[tokio::test]
    async fn connection_failure_is_not_cached() {
        let backend = MemoryBackend::new();
        backend.fail_next_connects(1);
        let registry = registry(&backend);

        let err = registry.get_tenant_database("a", &Deadline::none()).await.unwrap_err();
        assert!(matches!(err, AppError::Connection(_)));
        assert_eq!(registry.tenant_count().unwrap(), 0);

        registry.get_tenant_database("a", &Deadline::none()).await.unwrap();
        assert_eq!(registry.tenant_count().unwrap(), 1);
    }
}
