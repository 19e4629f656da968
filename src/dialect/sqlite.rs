use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, params, params_from_iter};

use crate::core::{
    BootstrapError, ColumnDescriptor, ColumnType, Result, Row, SchemaDescriptor, TableSpec, Value,
};
use crate::dialect::{Dialect, DialectKind, sql};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Embedded single-file store.
///
/// Uses `tokio::task::spawn_blocking` to run the synchronous rusqlite calls without
/// blocking the async runtime. Clones share one connection, so operations from the
/// same process never interleave on the file.
#[derive(Clone)]
pub struct SqliteDialect {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDialect {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BootstrapError::Io(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` against the connection on the blocking pool.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock()?;
            f(&guard)
        })
        .await?
    }

    async fn execute(&self, statement: String) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute_batch(&statement)?;
            Ok(())
        })
        .await
    }

    async fn query_rows(&self, statement: String, params: Vec<Value>) -> Result<Vec<Row>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&statement)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Row::new();
                for (idx, name) in columns.iter().enumerate() {
                    record.insert(name.clone(), Value::from(row.get_ref(idx)?));
                }
                records.push(record);
            }
            Ok(records)
        })
        .await
    }
}

#[async_trait]
impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn describe(&self, table: &str) -> Result<Option<SchemaDescriptor>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
            )?;
            let mut rows = stmt.query(params![table])?;

            let mut schema = SchemaDescriptor::new(&table);
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let declared_type: String = row.get(1)?;
                let not_null: i64 = row.get(2)?;
                let default: Option<String> = row.get(3)?;
                let pk: i64 = row.get(4)?;
                schema.push(
                    &name,
                    ColumnDescriptor {
                        column_type: ColumnType::from_declared(&declared_type),
                        declared_type,
                        nullable: not_null == 0 && pk == 0,
                        default,
                        primary_key: pk > 0,
                    },
                );
            }

            if schema.is_empty() {
                Ok(None)
            } else {
                Ok(Some(schema))
            }
        })
        .await
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        self.execute(sql::create_table(DialectKind::Sqlite, spec)).await
    }

    async fn insert_row(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        let statement = sql::insert_row(DialectKind::Sqlite, table, columns);
        let values = values.to_vec();
        self.with_conn(move |conn| {
            conn.execute(&statement, params_from_iter(values.iter()))?;
            Ok(())
        })
        .await
    }

    async fn drop_table_if_exists(&self, table: &str) -> Result<()> {
        self.execute(sql::drop_table_if_exists(table)).await
    }

    async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        self.execute(sql::rename_table(from, to)).await
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Row>> {
        self.query_rows(sql::select_all(DialectKind::Sqlite, table), Vec::new())
            .await
    }

    async fn select_in_insertion_order(
        &self,
        table: &str,
        created_column: Option<&str>,
    ) -> Result<Vec<Row>> {
        self.query_rows(
            sql::select_in_insertion_order(DialectKind::Sqlite, table, created_column),
            Vec::new(),
        )
        .await
    }

    async fn select_where_eq(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>> {
        self.query_rows(
            sql::select_where_eq(DialectKind::Sqlite, table, column),
            vec![value.clone()],
        )
        .await
    }
}
