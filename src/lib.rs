// ============================================================================
// Process Engine Runtime
// ============================================================================
//
// Startup gate of the process engine server: resolves the environment, brings
// every repository table to its current schema, validates and starts the
// services, then resumes process instances a previous run left behind.

pub mod bootstrap;
pub mod config;
pub mod container;
pub mod core;
pub mod dialect;
pub mod migration;
pub mod recovery;
pub mod routes;
pub mod services;

pub use bootstrap::{BootstrapReport, BootstrapSequencer, BootstrapStage, BootstrapState, Bootstrapped};
pub use config::{BootstrapOptions, EnvOverrides};
pub use container::{ContainerError, ServiceContainer, ServiceModule, Startable};
pub use core::{BootstrapError, Result, Value};
pub use dialect::{Dialect, DialectKind, NativeConnector, StoreConnector};
pub use migration::{MigrationOutcome, MigrationReport, MigrationRunner, TableMigration};
pub use recovery::{ChannelEngine, ExecutionEngine, RecoveryResumer, ResumptionReport};
pub use services::RuntimeModule;
