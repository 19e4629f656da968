//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use processengine_runtime::config::RepositoryStoreConfig;
use processengine_runtime::core::{BootstrapError, Result, Row, SchemaDescriptor, TableSpec, Value};
use processengine_runtime::dialect::{Dialect, DialectKind, SqliteDialect, StoreConnector};
use processengine_runtime::migration::REPOSITORIES;

/// Wraps a real dialect, counts every write and can fail a chosen insert.
pub struct RecordingDialect {
    inner: Arc<dyn Dialect>,
    writes: AtomicUsize,
    inserts: AtomicUsize,
    fail_on_insert: Option<usize>,
    log: Mutex<Vec<String>>,
}

impl RecordingDialect {
    pub fn new(inner: Arc<dyn Dialect>) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            fail_on_insert: None,
            log: Mutex::new(Vec::new()),
        }
    }

    /// The `n`th insert (1-based) fails without touching the store.
    pub fn failing_on_insert(mut self, n: usize) -> Self {
        self.fail_on_insert = Some(n);
        self
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Dialect for RecordingDialect {
    fn kind(&self) -> DialectKind {
        self.inner.kind()
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.inner.table_exists(table).await
    }

    async fn describe(&self, table: &str) -> Result<Option<SchemaDescriptor>> {
        self.inner.describe(table).await
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        self.record(format!("create {}", spec.name));
        self.inner.create_table(spec).await
    }

    async fn insert_row(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_insert == Some(n) {
            return Err(BootstrapError::Storage(format!("injected failure on insert {}", n)));
        }
        self.record(format!("insert {}", table));
        self.inner.insert_row(table, columns, values).await
    }

    async fn drop_table_if_exists(&self, table: &str) -> Result<()> {
        self.record(format!("drop {}", table));
        self.inner.drop_table_if_exists(table).await
    }

    async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        self.record(format!("rename {} {}", from, to));
        self.inner.rename_table(from, to).await
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Row>> {
        self.inner.select_all(table).await
    }

    async fn select_in_insertion_order(
        &self,
        table: &str,
        created_column: Option<&str>,
    ) -> Result<Vec<Row>> {
        self.inner.select_in_insertion_order(table, created_column).await
    }

    async fn select_where_eq(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>> {
        self.inner.select_where_eq(table, column, value).await
    }
}

/// Hands out one in-memory SQLite store per repository and remembers the connect order.
#[derive(Default)]
pub struct MemoryConnector {
    stores: Mutex<BTreeMap<String, SqliteDialect>>,
    connects: Mutex<Vec<String>>,
    fail_for: Option<String>,
}

impl MemoryConnector {
    pub fn failing_for(repository: &str) -> Self {
        Self {
            fail_for: Some(repository.to_string()),
            ..Default::default()
        }
    }

    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    pub fn store(&self, repository: &str) -> SqliteDialect {
        self.stores
            .lock()
            .unwrap()
            .entry(repository.to_string())
            .or_insert_with(|| SqliteDialect::open_in_memory().unwrap())
            .clone()
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, repository: &str, _store: &RepositoryStoreConfig) -> Result<Arc<dyn Dialect>> {
        self.connects.lock().unwrap().push(repository.to_string());
        if self.fail_for.as_deref() == Some(repository) {
            return Err(BootstrapError::Storage(format!("{} store is unreachable", repository)));
        }
        Ok(Arc::new(self.store(repository)))
    }
}

pub fn text_columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

pub fn sqlite_stores(dir: &Path) -> BTreeMap<String, RepositoryStoreConfig> {
    REPOSITORIES
        .iter()
        .map(|repo| {
            (
                repo.to_string(),
                RepositoryStoreConfig::sqlite(dir.join(format!("{}.sqlite", repo)).display().to_string()),
            )
        })
        .collect()
}

/// Writes a config tree for `environment` under `root`.
pub fn write_config_tree(root: &Path, environment: &str, dialect: &str) {
    let env_dir = root.join(environment);
    for repo in REPOSITORIES {
        let dir = env_dir.join("process_engine");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{}_repository.json", repo)),
            format!(r#"{{"dialect": "{}", "storage": "{}.sqlite"}}"#, dialect, repo),
        )
        .unwrap();
    }

    let iam = env_dir.join("iam");
    std::fs::create_dir_all(&iam).unwrap();
    std::fs::write(iam.join("iam_service.json"), r#"{"basePath": "http://localhost:5000"}"#).unwrap();

    let http = env_dir.join("http");
    std::fs::create_dir_all(&http).unwrap();
    std::fs::write(
        http.join("http_extension.json"),
        r#"{"server": {"host": "127.0.0.1", "port": 0}}"#,
    )
    .unwrap();
}
