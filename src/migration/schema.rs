use crate::core::{BootstrapError, ColumnType, Result, SchemaDescriptor};
use crate::dialect::Dialect;

/// Reads the live physical shape of tables. Never caches: every call hits the store.
pub struct SchemaInspector<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    pub async fn describe(&self, table: &str) -> Result<SchemaDescriptor> {
        self.dialect
            .describe(table)
            .await?
            .ok_or_else(|| BootstrapError::SchemaUnavailable(table.to_string()))
    }

    /// `false` when the table exists but the column is missing or has another type.
    pub async fn has_expected_type(
        &self,
        table: &str,
        column: &str,
        expected: &ColumnType,
    ) -> Result<bool> {
        let schema = self.describe(table).await?;
        Ok(schema
            .column(column)
            .is_some_and(|descriptor| &descriptor.column_type == expected))
    }
}
