use super::{Database, SingleFlight};
use crate::deadline::Deadline;
use crate::error::AppError;
use crate::model::{Fields, Record};
use crate::schema::SchemaDescriptor;
use std::sync::Arc;

/// Reads and writes records of one schema in one logical database.
pub struct ModelHandle {
    database: Arc<Database>,
    schema: Arc<SchemaDescriptor>,
}

impl ModelHandle {
    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub async fn find_one(&self, key: &str) -> Result<Option<Record>, AppError> {
        self.database
            .connection()
            .find_one(self.database.name(), &self.schema, key)
            .await
    }

    /// Single atomic create-or-merge on the backend. Callers want
    /// [`crate::service::UpsertService::upsert`], which validates and reconciles.
    pub async fn find_one_and_upsert(&self, key: &str, fields: &Fields) -> Result<Record, AppError> {
        self.database
            .connection()
            .find_one_and_upsert(self.database.name(), &self.schema, key, fields)
            .await
    }

    pub async fn find_all(&self) -> Result<Vec<Record>, AppError> {
        self.database
            .connection()
            .find_all(self.database.name(), &self.schema)
            .await
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("database", &self.database.name())
            .field("schema", &self.schema.name)
            .finish()
    }
}

type ModelKey = (String, String);

/// (database, schema name) to model handle. The first handle created for a key fixes its
/// descriptor; a later registration with a different descriptor is a conflict.
pub struct ModelRegistry {
    handles: SingleFlight<ModelKey, Arc<ModelHandle>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        ModelRegistry {
            handles: SingleFlight::new(),
        }
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_model(
        &self,
        database: &Arc<Database>,
        schema_name: &str,
        schema: &SchemaDescriptor,
        deadline: &Deadline,
    ) -> Result<Arc<ModelHandle>, AppError> {
        if schema_name != schema.name {
            return Err(AppError::Validation(format!(
                "schema name '{}' does not match descriptor '{}'",
                schema_name, schema.name
            )));
        }
        let key = (database.name().to_string(), schema.name.clone());
        let handle = match self.handles.get(&key)? {
            Some(handle) => handle,
            None => {
                deadline
                    .run(
                        "resolve model",
                        self.handles.get_or_try_init(&key, || Self::open(database, schema)),
                    )
                    .await?
            }
        };
        if *handle.schema != *schema {
            return Err(AppError::Conflict(format!(
                "model '{}' in '{}' is already registered with a different schema",
                schema.name,
                database.name()
            )));
        }
        Ok(handle)
    }

    /// Number of resolved model handles.
    pub fn len(&self) -> Result<usize, AppError> {
        self.handles.len()
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len()? == 0)
    }

    async fn open(database: &Arc<Database>, schema: &SchemaDescriptor) -> Result<Arc<ModelHandle>, AppError> {
        database
            .connection()
            .open_collection(database.name(), schema)
            .await?;
        tracing::info!(
            database = %database.name(),
            model = %schema.name,
            collection = %schema.collection,
            "registered model"
        );
        Ok(Arc::new(ModelHandle {
            database: database.clone(),
            schema: Arc::new(schema.clone()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ConnectionManager, TenantDatabaseRegistry};
    use crate::schema::FieldKind;
    use crate::store::MemoryBackend;
    use std::time::Duration;

    fn widgets() -> SchemaDescriptor {
        SchemaDescriptor::new("Widget", "widgets", "sku").field("color", FieldKind::String)
    }

    async fn tenant_db(backend: &MemoryBackend, tenant_id: &str) -> Arc<Database> {
        let connections = Arc::new(ConnectionManager::new("mem://local/test", Arc::new(backend.clone())));
        TenantDatabaseRegistry::new(connections)
            .get_tenant_database(tenant_id, &Deadline::none())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn same_key_same_handle() {
        let backend = MemoryBackend::new();
        let db = tenant_db(&backend, "a").await;
        let models = ModelRegistry::new();

        let m1 = models.get_model(&db, "Widget", &widgets(), &Deadline::none()).await.unwrap();
        let m2 = models.get_model(&db, "Widget", &widgets(), &Deadline::none()).await.unwrap();
        assert!(Arc::ptr_eq(&m1, &m2));
        assert_eq!(backend.stats().collections_opened, 1);
        assert_eq!(models.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn different_descriptor_under_same_key_conflicts() {
        let backend = MemoryBackend::new();
        let db = tenant_db(&backend, "a").await;
        let models = ModelRegistry::new();
        models.get_model(&db, "Widget", &widgets(), &Deadline::none()).await.unwrap();

        let changed = widgets().field("weight", FieldKind::Number);
        let err = models
            .get_model(&db, "Widget", &changed, &Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(backend.stats().collections_opened, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_registration_does_not_fix_the_descriptor() {
        let backend = MemoryBackend::with_latency(Duration::from_secs(1));
        let db = tenant_db(&backend, "a").await;
        let models = ModelRegistry::new();

        let err = models
            .get_model(&db, "Widget", &widgets(), &Deadline::after(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
        assert!(models.is_empty().unwrap());

        let changed = widgets().field("weight", FieldKind::Number);
        let handle = models.get_model(&db, "Widget", &changed, &Deadline::none()).await.unwrap();
        assert_eq!(*handle.schema(), changed);
        assert_eq!(models.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn schema_name_must_match_descriptor() {
        let backend = MemoryBackend::new();
        let db = tenant_db(&backend, "a").await;
        let err = ModelRegistry::new()
            .get_model(&db, "Gadget", &widgets(), &Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn each_database_gets_its_own_handle() {
        let backend = MemoryBackend::new();
        let connections = Arc::new(ConnectionManager::new("mem://local/test", Arc::new(backend.clone())));
        let dbs = TenantDatabaseRegistry::new(connections);
        let a = dbs.get_tenant_database("a", &Deadline::none()).await.unwrap();
        let b = dbs.get_tenant_database("b", &Deadline::none()).await.unwrap();
        let models = ModelRegistry::new();

        let ma = models.get_model(&a, "Widget", &widgets(), &Deadline::none()).await.unwrap();
        let mb = models.get_model(&b, "Widget", &widgets(), &Deadline::none()).await.unwrap();
        assert!(!Arc::ptr_eq(&ma, &mb));
        assert_eq!(ma.database().name(), "tenant-a");
        assert_eq!(mb.database().name(), "tenant-b");
        assert_eq!(models.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_first_calls_open_one_collection() {
        let backend = MemoryBackend::with_latency(Duration::from_millis(10));
        let db = tenant_db(&backend, "a").await;
        let models = Arc::new(ModelRegistry::new());

        let mut handles = Vec::new();
        for _ in 0..25 {
            let models = models.clone();
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                models.get_model(&db, "Widget", &widgets(), &Deadline::none()).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(backend.stats().collections_opened, 1);
    }
}
