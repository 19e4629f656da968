//! Environment and configuration resolution.
//!
//! The process environment is read exactly once, into [`EnvOverrides`]. Everything
//! after that works on explicit, immutable values.

pub mod paths;
pub mod provider;
pub mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::warn;

use crate::core::{BootstrapError, Result};

pub use paths::{StoragePaths, user_data_dir};
pub use provider::ConfigProvider;
pub use store::{PostgresSettings, RepositoryStoreConfig};

/// Environment used when none is selected explicitly.
pub const DEFAULT_ENVIRONMENT: &str = "sqlite";

pub const CONFIG_PATH_VAR: &str = "CONFIG_PATH";
pub const ENVIRONMENT_VAR: &str = "PROCESS_ENGINE_ENV";

/// Snapshot of the process environment variables the runtime understands.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub config_path: Option<String>,
    pub environment: Option<String>,
    pub home_dir: Option<PathBuf>,
    /// `section__subsection__field` style configuration overrides.
    pub overrides: BTreeMap<String, String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env = Self::default();
        let mut home = None;
        let mut profile = None;

        for (key, value) in vars {
            match key.as_str() {
                CONFIG_PATH_VAR => env.config_path = non_empty(value),
                ENVIRONMENT_VAR => env.environment = non_empty(value),
                "HOME" => home = non_empty(value),
                "USERPROFILE" => profile = non_empty(value),
                _ if key.contains("__") => {
                    env.overrides.insert(key, value);
                }
                _ => {}
            }
        }

        env.home_dir = home.or(profile).map(PathBuf::from);
        env
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Caller-supplied knobs for one bootstrap run.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub env: EnvOverrides,

    /// Config root used when `CONFIG_PATH` is absent or unusable.
    pub internal_config_root: PathBuf,

    /// Directory holding the embedded store files, overriding the per-user default.
    pub sqlite_path: Option<PathBuf>,

    /// Make the runtime working directory the process working directory.
    pub change_working_dir: bool,

    /// Also serve the informational routes at the HTTP root.
    pub use_http_root_routes: bool,
}

impl BootstrapOptions {
    pub fn new(env: EnvOverrides) -> Self {
        Self {
            env,
            internal_config_root: default_internal_config_root(),
            sqlite_path: None,
            change_working_dir: true,
            use_http_root_routes: false,
        }
    }

    pub fn internal_config_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.internal_config_root = path.into();
        self
    }

    pub fn sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sqlite_path = Some(path.into());
        self
    }

    pub fn change_working_dir(mut self, enabled: bool) -> Self {
        self.change_working_dir = enabled;
        self
    }

    pub fn use_http_root_routes(mut self, enabled: bool) -> Self {
        self.use_http_root_routes = enabled;
        self
    }
}

pub fn default_internal_config_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config")
}

/// Outcome of the first bootstrap stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    pub name: String,
    pub config_root: PathBuf,
}

impl ResolvedEnvironment {
    pub fn environment_dir(&self) -> PathBuf {
        self.config_root.join(&self.name)
    }

    pub fn is_embedded_store(&self) -> bool {
        self.name == DEFAULT_ENVIRONMENT
    }
}

pub fn resolve_environment(options: &BootstrapOptions) -> Result<ResolvedEnvironment> {
    let config_root = resolve_config_root(&options.env, &options.internal_config_root)?;

    let name = options
        .env
        .environment
        .clone()
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

    let environment_dir = config_root.join(&name);
    if !environment_dir.is_dir() {
        return Err(BootstrapError::Configuration(format!(
            "Configuration for environment \"{}\" is not available. \
             Please make sure the configuration files are available at: {}",
            name,
            environment_dir.display()
        )));
    }

    Ok(ResolvedEnvironment { name, config_root })
}

fn resolve_config_root(env: &EnvOverrides, internal_root: &Path) -> Result<PathBuf> {
    if let Some(provided) = &env.config_path {
        let candidate = PathBuf::from(provided);
        if candidate.is_absolute() {
            return ensure_config_path_exists(candidate);
        }

        warn!(
            "Cannot use path provided with {} ('{}'), because it is not absolute! \
             Falling back to default internal config.",
            CONFIG_PATH_VAR, provided
        );
    }

    ensure_config_path_exists(internal_root.to_path_buf())
}

fn ensure_config_path_exists(path: PathBuf) -> Result<PathBuf> {
    if !path.is_dir() {
        return Err(BootstrapError::Configuration(format!(
            "Specified configuration folder not found! Please make sure the folder {} exists!",
            path.display()
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config_tree(envs: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for env in envs {
            std::fs::create_dir_all(dir.path().join(env)).unwrap();
        }
        dir
    }

    #[test]
    fn test_env_overrides_capture() {
        let env = EnvOverrides::from_vars(vars(&[
            ("CONFIG_PATH", "/etc/pe"),
            ("PROCESS_ENGINE_ENV", "postgres"),
            ("HOME", "/home/alice"),
            ("iam__iam_service__basePath", "http://iam"),
            ("PATH", "/usr/bin"),
        ]));

        assert_eq!(env.config_path.as_deref(), Some("/etc/pe"));
        assert_eq!(env.environment.as_deref(), Some("postgres"));
        assert_eq!(env.home_dir, Some(PathBuf::from("/home/alice")));
        assert_eq!(env.overrides.len(), 1);
        assert_eq!(
            env.overrides.get("iam__iam_service__basePath").map(String::as_str),
            Some("http://iam")
        );
    }

    #[test]
    fn test_blank_environment_counts_as_unset() {
        let env = EnvOverrides::from_vars(vars(&[("PROCESS_ENGINE_ENV", "  ")]));
        assert!(env.environment.is_none());
    }

    #[test]
    fn test_default_environment_with_internal_root() {
        let root = config_tree(&["sqlite"]);
        let options =
            BootstrapOptions::new(EnvOverrides::default()).internal_config_root(root.path());

        let resolved = resolve_environment(&options).unwrap();
        assert_eq!(resolved.name, "sqlite");
        assert_eq!(resolved.config_root, root.path());
        assert!(resolved.is_embedded_store());
    }

    #[test]
    fn test_absolute_config_path_wins() {
        let internal = config_tree(&["sqlite"]);
        let external = config_tree(&["postgres"]);
        let env = EnvOverrides {
            config_path: Some(external.path().display().to_string()),
            environment: Some("postgres".to_string()),
            ..Default::default()
        };
        let options = BootstrapOptions::new(env).internal_config_root(internal.path());

        let resolved = resolve_environment(&options).unwrap();
        assert_eq!(resolved.config_root, external.path());
        assert!(!resolved.is_embedded_store());
    }

    #[test]
    fn test_relative_config_path_falls_back() {
        let internal = config_tree(&["sqlite"]);
        let env = EnvOverrides {
            config_path: Some("relative/config".to_string()),
            ..Default::default()
        };
        let options = BootstrapOptions::new(env).internal_config_root(internal.path());

        let resolved = resolve_environment(&options).unwrap();
        assert_eq!(resolved.config_root, internal.path());
    }

    #[test]
    fn test_missing_absolute_config_path_is_fatal() {
        let internal = config_tree(&["sqlite"]);
        let env = EnvOverrides {
            config_path: Some("/definitely/not/here/config".to_string()),
            ..Default::default()
        };
        let options = BootstrapOptions::new(env).internal_config_root(internal.path());

        let err = resolve_environment(&options).unwrap_err();
        assert!(matches!(err, BootstrapError::Configuration(_)));
        assert!(err.to_string().contains("/definitely/not/here/config"));
    }

    #[test]
    fn test_unknown_environment_is_fatal() {
        let internal = config_tree(&["sqlite"]);
        let env = EnvOverrides {
            environment: Some("staging".to_string()),
            ..Default::default()
        };
        let options = BootstrapOptions::new(env).internal_config_root(internal.path());

        let err = resolve_environment(&options).unwrap_err();
        assert!(matches!(err, BootstrapError::Configuration(_)));
        assert!(err.to_string().contains("staging"));
    }
}
