use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info};
use tracing::{Instrument, info_span};

use crate::config::RepositoryStoreConfig;
use crate::core::{BootstrapError, Result};
use crate::dialect::StoreConnector;
use crate::migration::{MigrationOutcome, RepositoryMigration};

/// Timing and outcome of one repository's migrations.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryReport {
    pub repository: String,
    pub outcomes: Vec<MigrationOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub repositories: Vec<RepositoryReport>,
}

impl MigrationReport {
    pub fn get(&self, repository: &str) -> Option<&RepositoryReport> {
        self.repositories.iter().find(|r| r.repository == repository)
    }
}

/// Runs the repository chains one after another and stops at the first failure.
pub struct MigrationRunner {
    connector: Arc<dyn StoreConnector>,
    migrations: Vec<RepositoryMigration>,
}

impl MigrationRunner {
    pub fn new(connector: Arc<dyn StoreConnector>, migrations: Vec<RepositoryMigration>) -> Self {
        Self {
            connector,
            migrations,
        }
    }

    pub fn repositories(&self) -> Vec<&str> {
        self.migrations
            .iter()
            .map(|m| m.repository.as_str())
            .collect()
    }

    pub async fn run(
        &self,
        stores: &BTreeMap<String, RepositoryStoreConfig>,
    ) -> Result<MigrationReport> {
        info!("Running migrations for {} repositories...", self.migrations.len());

        let mut report = MigrationReport::default();
        for migration in &self.migrations {
            let span = info_span!("migration.repository", repository = %migration.repository);
            let entry = self
                .run_repository(migration, stores)
                .instrument(span)
                .await
                .inspect_err(|e| {
                    error!("Migration of '{}' failed: {}", migration.repository, e)
                })?;
            report.repositories.push(entry);
        }

        info!("Migrations successfully executed.");
        Ok(report)
    }

    async fn run_repository(
        &self,
        migration: &RepositoryMigration,
        stores: &BTreeMap<String, RepositoryStoreConfig>,
    ) -> Result<RepositoryReport> {
        let started_at = Utc::now();
        let repository = migration.repository.clone();

        let store = stores.get(&repository).ok_or_else(|| {
            BootstrapError::Configuration(format!(
                "No store configuration for repository '{}'",
                repository
            ))
        })?;

        let dialect = self
            .connector
            .connect(&repository, store)
            .await
            .map_err(|e| wrap(&repository, e))?;

        let outcomes = migration
            .apply(dialect.as_ref())
            .await
            .map_err(|e| wrap(&repository, e))?;

        Ok(RepositoryReport {
            repository,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Schema and configuration errors pass through; everything else is attributed to the
/// repository.
fn wrap(repository: &str, err: BootstrapError) -> BootstrapError {
    match err {
        BootstrapError::SchemaUnavailable(_)
        | BootstrapError::Configuration(_)
        | BootstrapError::MigrationFailure { .. } => err,
        other => BootstrapError::MigrationFailure {
            repository: repository.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_attributes_storage_errors() {
        let err = wrap("external_task", BootstrapError::Storage("disk full".to_string()));
        match err {
            BootstrapError::MigrationFailure { repository, message } => {
                assert_eq!(repository, "external_task");
                assert!(message.contains("disk full"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrap_keeps_schema_errors() {
        let err = wrap("correlation", BootstrapError::SchemaUnavailable("Correlations".into()));
        assert!(matches!(err, BootstrapError::SchemaUnavailable(_)));
    }
}
