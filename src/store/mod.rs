//! Storage seam. A [`Backend`] opens the one shared [`Connection`]; every logical
//! database and collection is addressed through that connection by name.

mod memory;
mod postgres;

pub use memory::{BackendStats, MemoryBackend};
pub use postgres::{ensure_database_exists, PostgresBackend, PostgresConnection};

use crate::error::AppError;
use crate::model::{Fields, Record};
use crate::schema::SchemaDescriptor;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens connections to a backend address.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Connect to `address`. Unreachable hosts and rejected credentials are
    /// [`AppError::Connection`].
    async fn connect(&self, address: &str) -> Result<Arc<dyn Connection>, AppError>;
}

/// An open connection hosting any number of logical databases.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    /// Select the logical database `name`, creating it if it does not exist.
    async fn open_database(&self, name: &str) -> Result<(), AppError>;

    /// Create the collection for `schema` in `database` if it does not exist.
    async fn open_collection(&self, database: &str, schema: &SchemaDescriptor) -> Result<(), AppError>;

    async fn find_one(
        &self,
        database: &str,
        schema: &SchemaDescriptor,
        key: &str,
    ) -> Result<Option<Record>, AppError>;

    /// Atomically insert the record for `key` or merge `fields` into the existing one,
    /// returning the record as stored after the write.
    async fn find_one_and_upsert(
        &self,
        database: &str,
        schema: &SchemaDescriptor,
        key: &str,
        fields: &Fields,
    ) -> Result<Record, AppError>;

    /// All records of a collection, ordered by key.
    async fn find_all(&self, database: &str, schema: &SchemaDescriptor) -> Result<Vec<Record>, AppError>;
}
