//! PostgreSQL backend. The database named in the connection URL hosts every logical
//! database as a schema; each collection is a table keyed by the natural key.

use super::{Backend, Connection};
use crate::error::AppError;
use crate::model::{Fields, Record};
use crate::schema::SchemaDescriptor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;

/// SQLSTATEs raised when a concurrent `CREATE ... IF NOT EXISTS` from another process
/// won the race; the object exists either way.
const ALREADY_EXISTS_SQLSTATES: &[&str] = &["23505", "42P06", "42P07"];

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug)]
pub struct PostgresBackend {
    max_connections: u32,
}

impl Default for PostgresBackend {
    fn default() -> Self {
        PostgresBackend {
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl PostgresBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Connection>, AppError> {
        ensure_database_exists(address).await?;
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(address)
            .await
            .map_err(|e| AppError::Connection(e.to_string()))?;
        Ok(Arc::new(PostgresConnection { pool }))
    }
}

/// Shared pool behind the single logical connection.
#[derive(Clone)]
pub struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    /// Run idempotent DDL, treating "already exists" from a racing process as success.
    async fn execute_ddl(&self, sql: &str) -> Result<(), AppError> {
        tracing::debug!(sql = %sql, "query");
        match sqlx::query(sql).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db))
                if db
                    .code()
                    .map(|c| ALREADY_EXISTS_SQLSTATES.iter().any(|s| c == *s))
                    .unwrap_or(false) =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

type RecordRow = (String, serde_json::Value, DateTime<Utc>, DateTime<Utc>);

fn row_to_record((key, fields, created_at, updated_at): RecordRow) -> Result<Record, AppError> {
    match fields {
        serde_json::Value::Object(fields) => Ok(Record {
            key,
            fields,
            created_at,
            updated_at,
        }),
        other => Err(AppError::Internal(format!(
            "record '{}' has non-object fields: {}",
            key, other
        ))),
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn open_database(&self, name: &str) -> Result<(), AppError> {
        self.execute_ddl(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(name)))
            .await
    }

    async fn open_collection(&self, database: &str, schema: &SchemaDescriptor) -> Result<(), AppError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                natural_key TEXT PRIMARY KEY,
                fields JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            qualified_table(database, &schema.collection)
        );
        self.execute_ddl(&ddl).await
    }

    async fn find_one(
        &self,
        database: &str,
        schema: &SchemaDescriptor,
        key: &str,
    ) -> Result<Option<Record>, AppError> {
        let sql = format!(
            "SELECT natural_key, fields, created_at, updated_at FROM {} WHERE natural_key = $1",
            qualified_table(database, &schema.collection)
        );
        tracing::debug!(sql = %sql, key, "query");
        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_record).transpose()
    }

    async fn find_one_and_upsert(
        &self,
        database: &str,
        schema: &SchemaDescriptor,
        key: &str,
        fields: &Fields,
    ) -> Result<Record, AppError> {
        let sql = format!(
            r#"
            INSERT INTO {} AS t (natural_key, fields, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (natural_key)
            DO UPDATE SET fields = t.fields || EXCLUDED.fields, updated_at = NOW()
            RETURNING natural_key, fields, created_at, updated_at
            "#,
            qualified_table(database, &schema.collection)
        );
        tracing::debug!(sql = %sql, key, "query");
        let row: RecordRow = sqlx::query_as(&sql)
            .bind(key)
            .bind(sqlx::types::Json(fields))
            .fetch_one(&self.pool)
            .await?;
        row_to_record(row)
    }

    async fn find_all(&self, database: &str, schema: &SchemaDescriptor) -> Result<Vec<Record>, AppError> {
        let sql = format!(
            "SELECT natural_key, fields, created_at, updated_at FROM {} ORDER BY natural_key",
            qualified_table(database, &schema.collection)
        );
        tracing::debug!(sql = %sql, "query");
        let rows: Vec<RecordRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_record).collect()
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
/// If the admin database cannot be opened (managed hosts often forbid it) the check is
/// skipped and opening the pool reports whether the target database is usable.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::Connection(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = match opts.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(database = %db_name, error = %e, "admin database unavailable, skipping create check");
            return Ok(());
        }
    };
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        let created = sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await;
        match created {
            Ok(_) => {}
            // 42P04: duplicate_database, another process created it first.
            Err(sqlx::Error::Database(db)) if db.code().map(|c| c == "42P04").unwrap_or(false) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = url
        .get(scheme_end..)
        .and_then(|rest| rest.find('/'))
        .map(|i| scheme_end + i + 1)
        .ok_or_else(|| AppError::Connection("DATABASE_URL: no database path".into()))?;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let (db_name, query) = match path_and_query.split_once('?') {
        Some((db, q)) => (db.trim(), Some(q)),
        None => (path_and_query.trim(), None),
    };
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = match query {
        Some(q) => format!("{}postgres?{}", base, q),
        None => format!("{}postgres", base),
    };
    Ok((admin_url, db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified_table(database: &str, collection: &str) -> String {
    format!("{}.{}", quote_ident(database), quote_ident(collection))
}
