use std::fmt;
use std::sync::Arc;

use crate::core::{BootstrapError, ColumnType, Result, Row, SchemaDescriptor, TableSpec, Value};

pub type RowTransformFn = Arc<dyn Fn(&mut Row) + Send + Sync>;

/// One versioned rebuild of a table into `target`.
///
/// `renames` maps a target column to the source column it is filled from; every other
/// target column is filled from the same-named source column when there is one.
#[derive(Clone)]
pub struct MigrationStep {
    pub version: u32,
    pub target: TableSpec,
    pub check_column: String,
    pub expected_type: ColumnType,
    pub renames: Vec<(String, String)>,
    /// Write-once creation column that fixes the copy order on backends without a
    /// stable row id.
    pub order_column: Option<String>,
    row_transform: Option<RowTransformFn>,
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("version", &self.version)
            .field("target", &self.target.name)
            .field("check_column", &self.check_column)
            .field("expected_type", &self.expected_type)
            .field("renames", &self.renames)
            .field("order_column", &self.order_column)
            .field("has_row_transform", &self.row_transform.is_some())
            .finish()
    }
}

impl MigrationStep {
    pub fn new(
        version: u32,
        target: TableSpec,
        check_column: impl Into<String>,
        expected_type: ColumnType,
    ) -> Self {
        Self {
            version,
            target,
            check_column: check_column.into(),
            expected_type,
            renames: Vec::new(),
            order_column: None,
            row_transform: None,
        }
    }

    pub fn with_rename(mut self, target: impl Into<String>, source: impl Into<String>) -> Self {
        self.renames.push((target.into(), source.into()));
        self
    }

    pub fn with_order_column(mut self, column: impl Into<String>) -> Self {
        self.order_column = Some(column.into());
        self
    }

    /// Source column the copy is ordered by, when the live table has it.
    pub fn copy_order<'a>(&'a self, source: &SchemaDescriptor) -> Option<&'a str> {
        self.order_column
            .as_deref()
            .filter(|column| source.column(column).is_some())
    }

    /// Applied to every source row before it is projected onto the target columns.
    pub fn with_row_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&mut Row) + Send + Sync + 'static,
    {
        self.row_transform = Some(Arc::new(transform));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.version == 0 {
            return Err(BootstrapError::Configuration(
                "Migration step version must be >= 1".to_string(),
            ));
        }

        let check = self.target.find_column(&self.check_column).ok_or_else(|| {
            BootstrapError::Configuration(format!(
                "Check column '{}' is not part of table '{}'",
                self.check_column, self.target.name
            ))
        })?;
        if check.column_type != self.expected_type {
            return Err(BootstrapError::Configuration(format!(
                "Check column '{}' of table '{}' is declared as {} but expected {}",
                self.check_column, self.target.name, check.column_type, self.expected_type
            )));
        }

        for (target, _) in &self.renames {
            let column = self.target.find_column(target).ok_or_else(|| {
                BootstrapError::Configuration(format!(
                    "Renamed column '{}' is not part of table '{}'",
                    target, self.target.name
                ))
            })?;
            if !column.is_omittable() {
                return Err(BootstrapError::Configuration(format!(
                    "Renamed column '{}' of table '{}' must be nullable or defaulted",
                    target, self.target.name
                )));
            }
        }

        Ok(())
    }

    /// Works out which source column feeds which target column.
    ///
    /// Auto-increment columns are never copied so the surrogate key restarts densely.
    /// Fails when a required target column has no source and no default.
    pub fn column_mapping(&self, source: &SchemaDescriptor) -> Result<ColumnMapping> {
        let mut pairs = Vec::new();
        let mut missing_required = Vec::new();

        for column in &self.target.columns {
            if column.auto_increment {
                continue;
            }

            let source_name = self
                .renames
                .iter()
                .find(|(target, _)| target == &column.name)
                .map(|(_, source)| source.as_str())
                .unwrap_or(column.name.as_str());

            if source.column(source_name).is_some() {
                pairs.push((column.name.clone(), source_name.to_string()));
            } else if !column.is_omittable() {
                missing_required.push(column.name.clone());
            }
        }

        if !missing_required.is_empty() {
            return Err(BootstrapError::Storage(format!(
                "Table '{}' has no source for required column(s): {}",
                source.table,
                missing_required.join(", ")
            )));
        }

        Ok(ColumnMapping { pairs })
    }

    pub(crate) fn transform(&self, row: &mut Row) {
        if let Some(transform) = &self.row_transform {
            transform(row);
        }
    }
}

/// Target column <- source column pairs used for every copied row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pairs: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn target_columns(&self) -> Vec<String> {
        self.pairs.iter().map(|(target, _)| target.clone()).collect()
    }

    /// Values of `row` in target column order; absent keys become NULL.
    pub fn project(&self, row: &Row) -> Vec<Value> {
        self.pairs
            .iter()
            .map(|(_, source)| row.get(source).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
