//! In-process backend. Every clone shares the same storage; `connect` hands out
//! connections onto it. Call counters, artificial latency and injected failures make
//! resource creation and write races observable in tests.

use super::{Backend, Connection};
use crate::error::AppError;
use crate::model::{Fields, Record};
use crate::schema::SchemaDescriptor;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Snapshot of backend calls that reached the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub connects: u64,
    pub databases_opened: u64,
    pub collections_opened: u64,
    pub reads: u64,
    /// Successful writes only.
    pub writes: u64,
}

type Collection = BTreeMap<String, Record>;
type Database = HashMap<String, Collection>;

#[derive(Default)]
struct Counters {
    connects: AtomicU64,
    databases_opened: AtomicU64,
    collections_opened: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
}

#[derive(Default)]
struct Shared {
    counters: Counters,
    latency: Duration,
    connect_failures: AtomicU32,
    write_conflicts: AtomicU32,
    databases: Mutex<HashMap<String, Database>>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Database>>, AppError> {
        self.databases
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

/// Decrement `counter` if positive; true when a unit was taken.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every backend call sleeps for `latency` before touching the store.
    pub fn with_latency(latency: Duration) -> Self {
        MemoryBackend {
            shared: Arc::new(Shared {
                latency,
                ..Shared::default()
            }),
        }
    }

    pub fn stats(&self) -> BackendStats {
        let c = &self.shared.counters;
        BackendStats {
            connects: c.connects.load(Ordering::SeqCst),
            databases_opened: c.databases_opened.load(Ordering::SeqCst),
            collections_opened: c.collections_opened.load(Ordering::SeqCst),
            reads: c.reads.load(Ordering::SeqCst),
            writes: c.writes.load(Ordering::SeqCst),
        }
    }

    /// The next `n` connection attempts fail as if the host were unreachable.
    pub fn fail_next_connects(&self, n: u32) {
        self.shared.connect_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` upserts fail with a write conflict without writing anything.
    pub fn conflict_next_writes(&self, n: u32) {
        self.shared.write_conflicts.store(n, Ordering::SeqCst);
    }

    /// Names of logical databases created so far, sorted.
    pub fn database_names(&self) -> Result<Vec<String>, AppError> {
        let mut names: Vec<String> = self.shared.lock()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Raw contents of one collection, ordered by key.
    pub fn records(&self, database: &str, collection: &str) -> Result<Vec<Record>, AppError> {
        Ok(self
            .shared
            .lock()?
            .get(database)
            .and_then(|db| db.get(collection))
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Connection>, AppError> {
        self.shared.delay().await;
        if take_one(&self.shared.connect_failures) {
            return Err(AppError::Connection(format!("{}: connection refused", redact(address))));
        }
        self.shared.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryConnection {
            shared: self.shared.clone(),
        }))
    }
}

/// Strip credentials so the address can appear in errors.
fn redact(address: &str) -> &str {
    address.rsplit('@').next().unwrap_or(address)
}

struct MemoryConnection {
    shared: Arc<Shared>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn ping(&self) -> Result<(), AppError> {
        self.shared.delay().await;
        Ok(())
    }

    async fn open_database(&self, name: &str) -> Result<(), AppError> {
        self.shared.delay().await;
        self.shared.lock()?.entry(name.to_string()).or_default();
        self.shared.counters.databases_opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn open_collection(&self, database: &str, schema: &SchemaDescriptor) -> Result<(), AppError> {
        self.shared.delay().await;
        self.shared
            .lock()?
            .entry(database.to_string())
            .or_default()
            .entry(schema.collection.clone())
            .or_default();
        self.shared.counters.collections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_one(
        &self,
        database: &str,
        schema: &SchemaDescriptor,
        key: &str,
    ) -> Result<Option<Record>, AppError> {
        self.shared.delay().await;
        self.shared.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .shared
            .lock()?
            .get(database)
            .and_then(|db| db.get(&schema.collection))
            .and_then(|c| c.get(key))
            .cloned())
    }

    async fn find_one_and_upsert(
        &self,
        database: &str,
        schema: &SchemaDescriptor,
        key: &str,
        fields: &Fields,
    ) -> Result<Record, AppError> {
        self.shared.delay().await;
        if take_one(&self.shared.write_conflicts) {
            return Err(AppError::WriteConflict(format!(
                "{}.{}: concurrent write to '{}'",
                database, schema.collection, key
            )));
        }
        let now = Utc::now();
        let mut dbs = self.shared.lock()?;
        let collection = dbs
            .entry(database.to_string())
            .or_default()
            .entry(schema.collection.clone())
            .or_default();
        let record = collection
            .entry(key.to_string())
            .and_modify(|r| {
                r.fields.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                r.updated_at = now;
            })
            .or_insert_with(|| Record {
                key: key.to_string(),
                fields: fields.clone(),
                created_at: now,
                updated_at: now,
            })
            .clone();
        self.shared.counters.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn find_all(&self, database: &str, schema: &SchemaDescriptor) -> Result<Vec<Record>, AppError> {
        self.shared.delay().await;
        self.shared.counters.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .shared
            .lock()?
            .get(database)
            .and_then(|db| db.get(&schema.collection))
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }
}
