use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RepositoryStoreConfig;
use crate::core::{BootstrapError, Result};

pub const RUNTIME_DIR_NAME: &str = "process_engine_runtime";
pub const DATABASES_DIR_NAME: &str = "databases";

/// Platform location for per-user application data.
pub fn user_data_dir(home: &Path) -> PathBuf {
    if cfg!(target_os = "macos") {
        home.join("Library").join("Application Support")
    } else if cfg!(windows) {
        home.join("AppData").join("Roaming")
    } else {
        home.join(".config")
    }
}

/// Where the embedded store keeps its files for this process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub working_dir: PathBuf,
    pub database_dir: PathBuf,
    /// Repository name -> store file.
    pub repositories: BTreeMap<String, PathBuf>,
    pub logs_dir: PathBuf,
    pub metrics_dir: PathBuf,
}

impl StoragePaths {
    pub fn resolve(
        home: Option<&Path>,
        sqlite_path: Option<&Path>,
        stores: &BTreeMap<String, RepositoryStoreConfig>,
    ) -> Result<Self> {
        let home = home.ok_or_else(|| {
            BootstrapError::Configuration(
                "Cannot determine the user home directory (HOME/USERPROFILE unset)".to_string(),
            )
        })?;

        let working_dir = user_data_dir(home).join(RUNTIME_DIR_NAME);
        let database_dir = match sqlite_path {
            Some(path) => path.to_path_buf(),
            None => working_dir.join(DATABASES_DIR_NAME),
        };

        let mut repositories = BTreeMap::new();
        for (repository, store) in stores {
            repositories.insert(repository.clone(), database_dir.join(store.storage_path()?));
        }

        Ok(Self {
            logs_dir: database_dir.join("logs"),
            metrics_dir: database_dir.join("metrics"),
            working_dir,
            database_dir,
            repositories,
        })
    }

    pub fn create_dirs(&self) -> Result<()> {
        for dir in [
            &self.working_dir,
            &self.database_dir,
            &self.logs_dir,
            &self.metrics_dir,
        ] {
            fs::create_dir_all(dir).map_err(|e| {
                BootstrapError::Io(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Configuration overrides consumed by the repositories and the file based
    /// logging and metrics stores.
    pub fn overrides(&self) -> BTreeMap<String, String> {
        let mut overrides = BTreeMap::new();
        for (repository, path) in &self.repositories {
            overrides.insert(
                storage_override_key(repository),
                path.display().to_string(),
            );
        }
        overrides.insert(
            "process_engine__logging_repository__log_output_path".to_string(),
            self.logs_dir.display().to_string(),
        );
        overrides.insert(
            "process_engine__metrics_repository__log_output_path".to_string(),
            self.metrics_dir.display().to_string(),
        );
        overrides
    }
}

pub fn storage_override_key(repository: &str) -> String {
    format!("process_engine__{}_repository__storage", repository)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> BTreeMap<String, RepositoryStoreConfig> {
        let mut stores = BTreeMap::new();
        stores.insert(
            "correlation".to_string(),
            RepositoryStoreConfig::sqlite("correlation.sqlite"),
        );
        stores.insert(
            "external_task".to_string(),
            RepositoryStoreConfig::sqlite("external_task.sqlite"),
        );
        stores
    }

    #[test]
    fn test_default_database_dir_under_user_data() {
        let paths = StoragePaths::resolve(Some(Path::new("/home/alice")), None, &stores()).unwrap();

        let expected_working = user_data_dir(Path::new("/home/alice")).join(RUNTIME_DIR_NAME);
        assert_eq!(paths.working_dir, expected_working);
        assert_eq!(paths.database_dir, expected_working.join(DATABASES_DIR_NAME));
        assert_eq!(
            paths.repositories["external_task"],
            expected_working.join(DATABASES_DIR_NAME).join("external_task.sqlite")
        );
    }

    #[test]
    fn test_explicit_sqlite_path_wins() {
        let paths = StoragePaths::resolve(
            Some(Path::new("/home/alice")),
            Some(Path::new("/srv/pe")),
            &stores(),
        )
        .unwrap();

        assert_eq!(paths.database_dir, PathBuf::from("/srv/pe"));
        assert_eq!(paths.logs_dir, PathBuf::from("/srv/pe/logs"));

        let overrides = paths.overrides();
        assert_eq!(
            overrides[&storage_override_key("correlation")],
            "/srv/pe/correlation.sqlite"
        );
        assert_eq!(
            overrides["process_engine__metrics_repository__log_output_path"],
            "/srv/pe/metrics"
        );
        assert_eq!(overrides.len(), 4);
    }

    #[test]
    fn test_missing_home_is_configuration_error() {
        let err = StoragePaths::resolve(None, None, &stores()).unwrap_err();
        assert!(matches!(err, BootstrapError::Configuration(_)));
    }

    #[test]
    fn test_create_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let paths = StoragePaths::resolve(Some(temp.path()), None, &stores()).unwrap();
        paths.create_dirs().unwrap();
        assert!(paths.working_dir.is_dir());
        assert!(paths.logs_dir.is_dir());
        assert!(paths.metrics_dir.is_dir());
    }
}
