use tracing::{Instrument, Level, event, info_span};

use crate::core::{BootstrapError, Result};
use crate::dialect::Dialect;
use crate::migration::{MigrationOutcome, MigrationStep, SchemaInspector};

/// One idempotent rebuild of `table` into the shape of `step.target`.
///
/// The protocol, in order:
/// 1. live table already has the expected check type: nothing to do;
///    live table gone but staging present: finish the interrupted swap;
/// 2. drop any leftover staging table;
/// 3. create staging with the target columns;
/// 4. read all live rows in one pass, oldest insert first;
/// 5. insert them into staging one by one, in read order;
/// 6. drop the live table and rename staging into its place.
///
/// A failure in 3..6 leaves the store for the next run to clean up in step 2.
#[derive(Debug, Clone)]
pub struct TableMigration {
    table: String,
    staging: String,
    step: MigrationStep,
}

impl TableMigration {
    pub fn new(table: impl Into<String>, staging: impl Into<String>, step: MigrationStep) -> Self {
        Self {
            table: table.into(),
            staging: staging.into(),
            step,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn staging(&self) -> &str {
        &self.staging
    }

    pub async fn run(&self, dialect: &dyn Dialect) -> Result<MigrationOutcome> {
        let span = info_span!(
            "migration.table",
            table = %self.table,
            version = self.step.version,
            dialect = %dialect.kind()
        );
        self.run_inner(dialect).instrument(span).await
    }

    async fn run_inner(&self, dialect: &dyn Dialect) -> Result<MigrationOutcome> {
        let inspector = SchemaInspector::new(dialect);

        let source = match dialect.describe(&self.table).await? {
            Some(schema) => schema,
            None => {
                if dialect.table_exists(&self.staging).await? {
                    event!(
                        Level::WARN,
                        staging = %self.staging,
                        "live table missing, completing interrupted swap"
                    );
                    dialect.rename_table(&self.staging, &self.table).await?;
                    return Ok(MigrationOutcome::SwapCompleted);
                }
                return Err(BootstrapError::SchemaUnavailable(self.table.clone()));
            }
        };

        if inspector
            .has_expected_type(&self.table, &self.step.check_column, &self.step.expected_type)
            .await?
        {
            event!(Level::INFO, "table is already up to date");
            return Ok(MigrationOutcome::UpToDate);
        }

        let mapping = self.step.column_mapping(&source)?;

        dialect.drop_table_if_exists(&self.staging).await?;

        event!(
            Level::INFO,
            check_column = %self.step.check_column,
            expected = %self.step.expected_type,
            "rebuilding table"
        );
        dialect
            .create_table(&self.step.target.renamed(&self.staging))
            .await?;

        let rows = dialect
            .select_in_insertion_order(&self.table, self.step.copy_order(&source))
            .await?;
        let columns = mapping.target_columns();
        for mut row in rows.iter().cloned() {
            self.step.transform(&mut row);
            dialect
                .insert_row(&self.staging, &columns, &mapping.project(&row))
                .await?;
        }
        event!(Level::DEBUG, rows = rows.len(), "rows copied to staging");

        dialect.drop_table_if_exists(&self.table).await?;
        dialect.rename_table(&self.staging, &self.table).await?;

        event!(Level::INFO, rows = rows.len(), "table migrated");
        Ok(MigrationOutcome::Migrated { rows: rows.len() })
    }
}
