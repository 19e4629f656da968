//! Startup pipeline: environment, configuration, storage paths, migrations, service
//! container, core services, routes and crash recovery, strictly in that order.

pub mod stage;
pub mod state;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info, warn};
use tracing::{Instrument, info_span};

use crate::config::{
    BootstrapOptions, ConfigProvider, RepositoryStoreConfig, ResolvedEnvironment, StoragePaths,
    resolve_environment,
};
use crate::container::{ServiceContainer, ServiceModule};
use crate::core::{BootstrapError, Result};
use crate::dialect::{NativeConnector, StoreConnector};
use crate::migration::{
    MigrationReport, MigrationRunner, REPOSITORIES, RepositoryMigration, repository_migrations,
};
use crate::recovery::{RecoveryResumer, ResumptionReport};
use crate::routes::{ApplicationInfo, AuthorityInfo, informational_routes};
use crate::services::{
    APP_BOOTSTRAPPER, AUTO_START_SERVICES, HTTP_EXTENSION, HttpExtension, RESUME_PROCESS_SERVICE,
};

pub use stage::BootstrapStage;
pub use state::BootstrapState;

pub fn repository_config_key(repository: &str) -> String {
    format!("process_engine:{}_repository", repository)
}

/// What happened during a run that reached `Running`.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub stages: Vec<BootstrapStage>,
    pub migrations: MigrationReport,
    /// Non-fatal `ServiceStart` failures, in start order.
    pub service_failures: Vec<BootstrapError>,
    pub resumption: Option<ResumptionReport>,
    pub resumption_error: Option<String>,
}

impl BootstrapReport {
    pub fn reached(&self, stage: BootstrapStage) -> bool {
        self.stages.contains(&stage)
    }

    fn advance(&mut self, stage: BootstrapStage) {
        debug_assert!(
            self.stages.last().is_none_or(|last| *last < stage),
            "bootstrap stages only move forward"
        );
        info!("Bootstrap stage reached: {}", stage);
        self.stages.push(stage);
    }
}

#[derive(Debug)]
pub struct Bootstrapped {
    pub state: BootstrapState,
    pub report: BootstrapReport,
}

/// Runs the startup pipeline once.
///
/// Configuration, migration and container errors abort the run; service start and
/// resumption problems are logged and recorded in the report.
pub struct BootstrapSequencer {
    options: BootstrapOptions,
    connector: Arc<dyn StoreConnector>,
    modules: Vec<Arc<dyn ServiceModule>>,
    migrations: Option<Vec<RepositoryMigration>>,
}

impl BootstrapSequencer {
    pub fn new(options: BootstrapOptions) -> Self {
        Self {
            options,
            connector: Arc::new(NativeConnector),
            modules: Vec::new(),
            migrations: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn StoreConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_module(mut self, module: Arc<dyn ServiceModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Replaces the built-in repository chains.
    pub fn with_migrations(mut self, migrations: Vec<RepositoryMigration>) -> Self {
        self.migrations = Some(migrations);
        self
    }

    pub async fn run(self) -> Result<Bootstrapped> {
        let span = info_span!("bootstrap");
        self.run_inner()
            .instrument(span)
            .await
            .inspect_err(|e| error!("Bootstrap failed: {}", e))
    }

    async fn run_inner(self) -> Result<Bootstrapped> {
        let mut report = BootstrapReport::default();

        let environment = resolve_environment(&self.options)?;
        info!(
            "Using environment '{}' with config root {}",
            environment.name,
            environment.config_root.display()
        );
        report.advance(BootstrapStage::EnvironmentResolved);

        let mut config = ConfigProvider::new(&environment, self.options.env.overrides.clone());
        let mut stores = load_stores(&config)?;
        report.advance(BootstrapStage::ConfigLoaded);

        let mut working_dir = None;
        let mut storage = BTreeMap::new();
        if environment.is_embedded_store() {
            let paths = self.resolve_paths(&stores)?;
            config = config.with_overrides(&paths.overrides());
            stores = load_stores(&config)?;
            working_dir = Some(paths.working_dir.clone());
            storage = paths.repositories;
            report.advance(BootstrapStage::PathsResolved);
        }

        let migrations = match self.migrations {
            Some(migrations) => migrations,
            None => repository_migrations()?,
        };
        let runner = MigrationRunner::new(Arc::clone(&self.connector), migrations);
        report.migrations = runner.run(&stores).await?;
        report.advance(BootstrapStage::MigrationsComplete);

        let container = build_container(&self.modules, &config)?;
        report.advance(BootstrapStage::ContainerValidated);

        start_core_services(&container, &mut report.service_failures).await;
        report.advance(BootstrapStage::CoreServicesStarted);

        configure_routes(&container, &config, self.options.use_http_root_routes)?;
        report.advance(BootstrapStage::RoutesConfigured);

        match resume_interrupted(&container).await {
            Ok(resumption) => report.resumption = resumption,
            Err(e) => {
                error!("Resuming interrupted process instances failed: {}", e);
                report.resumption_error = Some(e.to_string());
            }
        }
        report.advance(BootstrapStage::ResumptionComplete);

        let state = BootstrapState {
            config_root: environment.config_root.clone(),
            environment: environment.name.clone(),
            working_dir,
            storage,
            overrides: config.overrides().clone(),
            stores,
            config,
            container: Arc::new(container),
        };
        report.advance(BootstrapStage::Running);
        log_ready(&environment, &report);

        Ok(Bootstrapped { state, report })
    }

    fn resolve_paths(
        &self,
        stores: &BTreeMap<String, RepositoryStoreConfig>,
    ) -> Result<StoragePaths> {
        let paths = StoragePaths::resolve(
            self.options.env.home_dir.as_deref(),
            self.options.sqlite_path.as_deref(),
            stores,
        )?;
        paths.create_dirs()?;

        if self.options.change_working_dir {
            std::env::set_current_dir(&paths.working_dir).map_err(|e| {
                BootstrapError::Io(format!(
                    "Failed to change working directory to {}: {}",
                    paths.working_dir.display(),
                    e
                ))
            })?;
        }

        info!("Using database directory {}", paths.database_dir.display());
        Ok(paths)
    }
}

fn load_stores(config: &ConfigProvider) -> Result<BTreeMap<String, RepositoryStoreConfig>> {
    let mut stores = BTreeMap::new();
    for repository in REPOSITORIES {
        let store = config.load::<RepositoryStoreConfig>(&repository_config_key(repository))?;
        stores.insert(repository.to_string(), store);
    }
    Ok(stores)
}

fn build_container(
    modules: &[Arc<dyn ServiceModule>],
    config: &ConfigProvider,
) -> Result<ServiceContainer> {
    let mut container = ServiceContainer::new().with_config(config.clone());
    for module in modules {
        container.register_module(module.as_ref());
    }
    container.validate_dependencies()?;
    info!("Validated {} service registrations", container.names().len());
    Ok(container)
}

/// Starts the application, then each auto-start service independently.
async fn start_core_services(container: &ServiceContainer, failures: &mut Vec<BootstrapError>) {
    for service in std::iter::once(APP_BOOTSTRAPPER).chain(AUTO_START_SERVICES) {
        let span = info_span!("bootstrap.service", service = service);
        if let Err(e) = start_service(container, service).instrument(span).await {
            error!("Failed to start '{}': {}", service, e);
            failures.push(BootstrapError::ServiceStart {
                service: service.to_string(),
                message: e.to_string(),
            });
        }
    }
}

async fn start_service(container: &ServiceContainer, service: &str) -> Result<()> {
    let startable = container.resolve_startable(service)?;
    startable.start().await?;
    info!("Started '{}'", service);
    Ok(())
}

fn configure_routes(
    container: &ServiceContainer,
    config: &ConfigProvider,
    use_root_routes: bool,
) -> Result<()> {
    if !container.is_registered(HTTP_EXTENSION) {
        warn!("No '{}' registered, informational routes are not served", HTTP_EXTENSION);
        return Ok(());
    }

    let http = container.resolve::<HttpExtension>(HTTP_EXTENSION)?;
    let authority = AuthorityInfo::from_config(config)?;
    http.merge_routes(informational_routes(
        ApplicationInfo::from_package(),
        authority,
        use_root_routes,
    ))
}

async fn resume_interrupted(container: &ServiceContainer) -> Result<Option<ResumptionReport>> {
    if !container.is_registered(RESUME_PROCESS_SERVICE) {
        warn!("No '{}' registered, skipping resumption", RESUME_PROCESS_SERVICE);
        return Ok(None);
    }

    let resumer = container
        .resolve::<RecoveryResumer>(RESUME_PROCESS_SERVICE)
        .map_err(|e| BootstrapError::Resumption(e.to_string()))?;
    let report = resumer
        .resume_interrupted()
        .instrument(info_span!("bootstrap.resumption"))
        .await?;
    info!(
        "Resumption finished: {} found, {} resumed, {} failed",
        report.found, report.resumed, report.failed
    );
    Ok(Some(report))
}

fn log_ready(environment: &ResolvedEnvironment, report: &BootstrapReport) {
    if report.service_failures.is_empty() {
        info!("Process engine runtime running (environment '{}')", environment.name);
    } else {
        warn!(
            "Process engine runtime running (environment '{}') with {} service start failure(s)",
            environment.name,
            report.service_failures.len()
        );
    }
}
