//! Process-wide caches of lazily created resources: the shared connection, one logical
//! database per tenant, one model handle per (database, schema).

mod connection;
mod database;
mod model;

pub use connection::ConnectionManager;
pub use database::{database_name, Database, TenantDatabaseRegistry};
pub use model::{ModelHandle, ModelRegistry};

use crate::error::AppError;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;

fn poisoned<T>(_: T) -> AppError {
    AppError::Internal("registry lock poisoned".into())
}

/// Keyed single-flight cache. The map lock is held only to find or insert a key's slot;
/// initialization runs on the slot, so different keys never wait on each other. A failed
/// or cancelled initialization leaves the slot empty for the next caller.
pub(crate) struct SingleFlight<K, V> {
    slots: RwLock<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        SingleFlight {
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> Result<Arc<OnceCell<V>>, AppError> {
        if let Some(slot) = self.slots.read().map_err(poisoned)?.get(key) {
            return Ok(slot.clone());
        }
        let mut slots = self.slots.write().map_err(poisoned)?;
        Ok(slots.entry(key.clone()).or_default().clone())
    }

    /// Cached value for `key`, if initialized.
    pub(crate) fn get(&self, key: &K) -> Result<Option<V>, AppError> {
        Ok(self
            .slots
            .read()
            .map_err(poisoned)?
            .get(key)
            .and_then(|slot| slot.get().cloned()))
    }

    pub(crate) async fn get_or_try_init<F, Fut>(&self, key: &K, init: F) -> Result<V, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, AppError>>,
    {
        let slot = self.slot(key)?;
        slot.get_or_try_init(init).await.cloned()
    }

    /// Number of initialized entries.
    pub(crate) fn len(&self) -> Result<usize, AppError> {
        Ok(self
            .slots
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|slot| slot.initialized())
            .count())
    }
}
