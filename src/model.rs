//! Persisted record shape and the two entities built on it: tenants and customers.

use crate::error::AppError;
use crate::schema::{FieldKind, SchemaDescriptor};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Field values of a record, keyed by field name.
pub type Fields = serde_json::Map<String, Value>;

/// Logical database that hosts the tenant collection.
pub const ROOT_DATABASE: &str = "admindb";

/// Longest customer name accepted.
pub const MAX_CUSTOMER_NAME_LEN: usize = 256;

/// A stored row as the backend returns it after a read or write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub fields: Fields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Fields plus `createdAt` / `updatedAt`, the shape entities deserialize from.
    pub fn to_document(&self) -> Value {
        let mut doc = self.fields.clone();
        doc.insert("createdAt".into(), Value::String(timestamp(&self.created_at)));
        doc.insert("updatedAt".into(), Value::String(timestamp(&self.updated_at)));
        Value::Object(doc)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.to_document())
            .map_err(|e| AppError::Internal(format!("stored record '{}' does not decode: {}", self.key, e)))
    }

    /// True when every field in `fields` is stored with the same value.
    pub fn has_fields(&self, fields: &Fields) -> bool {
        fields.iter().all(|(k, v)| self.fields.get(k) == Some(v))
    }
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// A typed record with one canonical schema.
pub trait Entity: DeserializeOwned + Send {
    fn schema() -> &'static SchemaDescriptor;

    fn from_record(record: &Record) -> Result<Self, AppError> {
        record.decode()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Fields written by tenant registration: the id doubles as the display name.
    pub fn registration_fields(tenant_id: &str) -> Fields {
        let mut f = Fields::new();
        f.insert("id".into(), Value::String(tenant_id.to_string()));
        f.insert("name".into(), Value::String(tenant_id.to_string()));
        f
    }
}

impl Entity for Tenant {
    fn schema() -> &'static SchemaDescriptor {
        static SCHEMA: OnceLock<SchemaDescriptor> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaDescriptor::new("Tenant", "tenants", "id")
                .required("name", FieldKind::String)
                .with_timestamps()
        })
    }
}

/// A customer organization stored inside its tenant's logical database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub customer_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn registration_fields(customer_name: &str) -> Fields {
        let mut f = Fields::new();
        f.insert("customerName".into(), Value::String(customer_name.to_string()));
        f
    }
}

impl Entity for Customer {
    fn schema() -> &'static SchemaDescriptor {
        static SCHEMA: OnceLock<SchemaDescriptor> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            SchemaDescriptor::new("Organization", "organizations", "customerName")
                .max_length("customerName", MAX_CUSTOMER_NAME_LEN)
                .with_timestamps()
        })
    }
}
