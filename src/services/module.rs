use std::sync::Arc;

use crate::config::RepositoryStoreConfig;
use crate::container::{ServiceContainer, ServiceModule};
use crate::dialect::StoreConnector;
use crate::migration::registry::CORRELATION;
use crate::recovery::{ExecutionEngine, RecoveryResumer, SqlInFlightWorkSource};
use crate::services::{
    APP_BOOTSTRAPPER, AUTO_START_SERVICE, AppBootstrapper, AutoStartService, CRONJOB_SERVICE,
    Cronjob, CronjobService, HTTP_EXTENSION, HttpExtension, HttpSettings, Job,
    RESUME_PROCESS_SERVICE,
};

pub const HTTP_CONFIG_KEY: &str = "http:http_extension";

/// Registers the services every runtime needs: the HTTP extension, the application
/// bootstrapper, the auto-start and cronjob services, and process resumption.
pub struct RuntimeModule {
    connector: Arc<dyn StoreConnector>,
    engine: Arc<dyn ExecutionEngine>,
    auto_start_jobs: Vec<Job>,
    cronjobs: Vec<Cronjob>,
}

impl RuntimeModule {
    pub fn new(connector: Arc<dyn StoreConnector>, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            connector,
            engine,
            auto_start_jobs: Vec::new(),
            cronjobs: Vec::new(),
        }
    }

    pub fn with_auto_start_job(mut self, job: Job) -> Self {
        self.auto_start_jobs.push(job);
        self
    }

    pub fn with_cronjob(mut self, cronjob: Cronjob) -> Self {
        self.cronjobs.push(cronjob);
        self
    }
}

impl ServiceModule for RuntimeModule {
    fn name(&self) -> &str {
        "runtime"
    }

    fn register(&self, container: &mut ServiceContainer) {
        container
            .register(HTTP_EXTENSION, |ctx| {
                Ok(HttpExtension::new(ctx.config_as::<HttpSettings>()?))
            })
            .configure(HTTP_CONFIG_KEY)
            .singleton()
            .startable();

        container
            .register(APP_BOOTSTRAPPER, |ctx| {
                Ok(AppBootstrapper::new(
                    ctx.resolve::<HttpExtension>(HTTP_EXTENSION)?,
                ))
            })
            .dependencies([HTTP_EXTENSION])
            .singleton()
            .startable();

        let jobs = self.auto_start_jobs.clone();
        container
            .register(AUTO_START_SERVICE, move |_| {
                Ok(AutoStartService::new(jobs.clone()))
            })
            .singleton()
            .startable();

        let cronjobs = self.cronjobs.clone();
        container
            .register(CRONJOB_SERVICE, move |_| {
                Ok(CronjobService::new(cronjobs.clone()))
            })
            .singleton()
            .startable();

        let connector = Arc::clone(&self.connector);
        let engine = Arc::clone(&self.engine);
        container
            .register(RESUME_PROCESS_SERVICE, move |ctx| {
                let store = ctx.config_as::<RepositoryStoreConfig>()?;
                let source = SqlInFlightWorkSource::new(Arc::clone(&connector), store);
                Ok(RecoveryResumer::new(Arc::new(source), Arc::clone(&engine)))
            })
            .configure(&crate::bootstrap::repository_config_key(CORRELATION))
            .singleton();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::NativeConnector;
    use crate::recovery::ChannelEngine;

    #[test]
    fn test_registrations_validate() {
        let (engine, _requests) = ChannelEngine::new(1);
        let module = RuntimeModule::new(Arc::new(NativeConnector), Arc::new(engine));

        let mut container = ServiceContainer::new();
        container.register_module(&module);
        container.validate_dependencies().unwrap();

        assert_eq!(
            container.names(),
            &[
                HTTP_EXTENSION,
                APP_BOOTSTRAPPER,
                AUTO_START_SERVICE,
                CRONJOB_SERVICE,
                RESUME_PROCESS_SERVICE
            ]
        );
        assert_eq!(
            container.dependencies_of(APP_BOOTSTRAPPER).unwrap(),
            &[HTTP_EXTENSION.to_string()]
        );
    }

    #[test]
    fn test_http_extension_without_config_uses_defaults() {
        let (engine, _requests) = ChannelEngine::new(1);
        let module = RuntimeModule::new(Arc::new(NativeConnector), Arc::new(engine));
        let mut container = ServiceContainer::new();
        container.register_module(&module);

        let http = container.resolve::<HttpExtension>(HTTP_EXTENSION).unwrap();
        assert_eq!(http.settings(), &HttpSettings::default());
    }
}
