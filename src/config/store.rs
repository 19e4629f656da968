use std::path::PathBuf;

use serde::Deserialize;

use crate::core::{BootstrapError, Result};
use crate::dialect::DialectKind;

/// Connection options of one repository store, as found in
/// `process_engine/<repository>_repository.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RepositoryStoreConfig {
    pub dialect: DialectKind,
    /// File of the embedded store.
    pub storage: Option<String>,
    pub host: String,
    #[serde(deserialize_with = "crate::config::provider::port_number")]
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for RepositoryStoreConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Sqlite,
            storage: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "processengine".to_string(),
            username: "admin".to_string(),
            password: String::new(),
        }
    }
}

impl RepositoryStoreConfig {
    pub fn sqlite(storage: impl Into<String>) -> Self {
        Self {
            storage: Some(storage.into()),
            ..Self::default()
        }
    }

    pub fn storage_path(&self) -> Result<PathBuf> {
        self.storage
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                BootstrapError::Configuration(
                    "Embedded store configuration is missing the 'storage' file".to_string(),
                )
            })
    }

    pub fn postgres_settings(&self) -> PostgresSettings {
        PostgresSettings {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl PostgresSettings {
    /// Key/value connection string understood by `tokio_postgres::connect`.
    pub fn connection_string(&self) -> String {
        let mut parts = vec![
            format!("host={}", quote_param(&self.host)),
            format!("port={}", self.port),
            format!("dbname={}", quote_param(&self.database)),
            format!("user={}", quote_param(&self.username)),
        ];
        if !self.password.is_empty() {
            parts.push(format!("password={}", quote_param(&self.password)));
        }
        parts.join(" ")
    }

    /// Connection description safe for logs.
    pub fn redacted(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

fn quote_param(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sqlite_store() {
        let config: RepositoryStoreConfig =
            serde_json::from_str(r#"{"dialect": "sqlite", "storage": "external_task.sqlite", "logging": false}"#)
                .unwrap();
        assert_eq!(config.dialect, DialectKind::Sqlite);
        assert_eq!(
            config.storage_path().unwrap(),
            PathBuf::from("external_task.sqlite")
        );
    }

    #[test]
    fn test_parse_postgres_store() {
        let config: RepositoryStoreConfig = serde_json::from_str(
            r#"{"dialect": "postgres", "host": "db", "port": 5433, "database": "pe", "username": "admin", "password": "o'k"}"#,
        )
        .unwrap();
        let settings = config.postgres_settings();
        assert_eq!(
            settings.connection_string(),
            "host='db' port=5433 dbname='pe' user='admin' password='o\\'k'"
        );
        assert!(!settings.redacted().contains("o'k"));
    }

    #[test]
    fn test_missing_storage_is_configuration_error() {
        let config = RepositoryStoreConfig::default();
        assert!(matches!(
            config.storage_path(),
            Err(BootstrapError::Configuration(_))
        ));
    }
}
