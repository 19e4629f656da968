use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ConfigProvider, RepositoryStoreConfig};
use crate::container::ServiceContainer;

/// Everything the bootstrap worked out, frozen once the runtime is running.
#[derive(Clone)]
pub struct BootstrapState {
    pub config_root: PathBuf,
    pub environment: String,
    /// Set only for the embedded store.
    pub working_dir: Option<PathBuf>,
    /// Repository -> store file, embedded store only.
    pub storage: BTreeMap<String, PathBuf>,
    pub overrides: BTreeMap<String, String>,
    pub stores: BTreeMap<String, RepositoryStoreConfig>,
    pub config: ConfigProvider,
    pub container: Arc<ServiceContainer>,
}

impl std::fmt::Debug for BootstrapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapState")
            .field("config_root", &self.config_root)
            .field("environment", &self.environment)
            .field("working_dir", &self.working_dir)
            .field("storage", &self.storage)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .field("services", &self.container.names())
            .finish()
    }
}
