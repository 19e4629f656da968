//! Idempotent table-rebuild migrations.

pub mod registry;
pub mod runner;
pub mod schema;
pub mod step;
pub mod table;

pub use registry::{REPOSITORIES, RepositoryMigration, legacy_schema, repository_migrations};
pub use runner::{MigrationReport, MigrationRunner, RepositoryReport};
pub use schema::SchemaInspector;
pub use step::{ColumnMapping, MigrationStep, RowTransformFn};
pub use table::TableMigration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Check column already had the expected type; nothing was written.
    UpToDate,
    /// A previous run dropped the live table but never renamed staging; the rename was done now.
    SwapCompleted,
    /// Table was rebuilt and this many rows were copied.
    Migrated { rows: usize },
    /// Store was empty and the table was created at its current shape.
    Created,
}
