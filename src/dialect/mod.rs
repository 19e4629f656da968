//! Backend abstraction for the handful of primitive operations the migration
//! engine and the recovery queries need.

pub mod postgres;
pub mod sql;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RepositoryStoreConfig;
use crate::core::{Result, Row, SchemaDescriptor, TableSpec, Value};

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// Embedded single-file store.
    Sqlite,
    /// Client-server relational store.
    #[serde(alias = "postgresql")]
    Postgres,
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

/// Dialect-correct execution of the primitive schema and row operations.
///
/// Every insert is one row per statement with bound parameters, on every backend.
#[async_trait]
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Live shape of `table`, `None` when the table does not exist.
    async fn describe(&self, table: &str) -> Result<Option<SchemaDescriptor>>;

    async fn create_table(&self, spec: &TableSpec) -> Result<()>;

    async fn insert_row(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()>;

    async fn drop_table_if_exists(&self, table: &str) -> Result<()>;

    async fn rename_table(&self, from: &str, to: &str) -> Result<()>;

    /// All rows in storage order.
    async fn select_all(&self, table: &str) -> Result<Vec<Row>>;

    /// All rows, oldest insert first, even after rows were updated.
    ///
    /// `created_column` names a write-once creation timestamp for backends without an
    /// insertion-ordered row id.
    async fn select_in_insertion_order(
        &self,
        table: &str,
        created_column: Option<&str>,
    ) -> Result<Vec<Row>>;

    async fn select_where_eq(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>>;
}

/// Opens the backend a repository store is configured for.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, repository: &str, store: &RepositoryStoreConfig) -> Result<Arc<dyn Dialect>>;
}

/// Connects to real SQLite files and PostgreSQL servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConnector;

#[async_trait]
impl StoreConnector for NativeConnector {
    async fn connect(&self, repository: &str, store: &RepositoryStoreConfig) -> Result<Arc<dyn Dialect>> {
        match store.dialect {
            DialectKind::Sqlite => {
                let path = store.storage_path()?;
                log::debug!("Opening {} store at {}", repository, path.display());
                Ok(Arc::new(SqliteDialect::open(&path)?))
            }
            DialectKind::Postgres => {
                let settings = store.postgres_settings();
                log::debug!("Connecting {} store to {}", repository, settings.redacted());
                Ok(Arc::new(PostgresDialect::connect(&settings).await?))
            }
        }
    }
}
