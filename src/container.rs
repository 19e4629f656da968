//! Named service registry with declared dependencies.
//!
//! Modules register factories under a name; the bootstrap validates the whole
//! dependency graph before anything is built, then resolves and starts the
//! components it needs. Registrations are fixed once the container is handed to the
//! sequencer; only the instance cache changes afterwards.

use std::any::Any;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::config::ConfigProvider;
use crate::core::{BootstrapError, Result};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Service '{0}' is not registered")]
    NotRegistered(String),

    #[error("Service '{service}' depends on '{dependency}', which is not registered")]
    MissingDependency { service: String, dependency: String },

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Service '{service}' resolved '{dependency}' without declaring it as a dependency")]
    UndeclaredDependency { service: String, dependency: String },

    #[error("Service '{0}' is not of the requested type")]
    TypeMismatch(String),

    #[error("Service '{0}' is not registered as startable")]
    NotStartable(String),

    #[error("Service '{service}' could not be created: {message}")]
    Factory { service: String, message: String },
}

impl From<ContainerError> for BootstrapError {
    fn from(err: ContainerError) -> Self {
        BootstrapError::DependencyResolution(err.to_string())
    }
}

/// Components registered with `.startable()` are started by the bootstrap.
#[async_trait]
pub trait Startable: Send + Sync {
    async fn start(&self) -> Result<()>;
}

/// A unit of registrations contributed by one feature area.
pub trait ServiceModule: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, container: &mut ServiceContainer);
}

type AnyInstance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&ResolveContext<'_>) -> Result<AnyInstance> + Send + Sync>;
type StartableCast = Arc<dyn Fn(AnyInstance) -> Option<Arc<dyn Startable>> + Send + Sync>;

struct Registration {
    dependencies: Vec<String>,
    config_key: Option<String>,
    singleton: bool,
    startable: Option<StartableCast>,
    factory: Factory,
}

/// What a factory sees while its service is being built.
pub struct ResolveContext<'a> {
    container: &'a ServiceContainer,
    service: &'a str,
    dependencies: &'a [String],
    config: JsonValue,
}

impl ResolveContext<'_> {
    pub fn service(&self) -> &str {
        self.service
    }

    /// Section named by `.configure(..)`, `null` when none was declared.
    pub fn config(&self) -> &JsonValue {
        &self.config
    }

    /// Deserializes the section; no section behaves like an empty object.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T> {
        let section = match &self.config {
            JsonValue::Null => JsonValue::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(section).map_err(|e| {
            BootstrapError::Configuration(format!(
                "Invalid configuration for service '{}': {}",
                self.service, e
            ))
        })
    }

    pub fn resolve<T: Send + Sync + 'static>(&self, dependency: &str) -> Result<Arc<T>> {
        if !self.dependencies.iter().any(|d| d == dependency) {
            return Err(ContainerError::UndeclaredDependency {
                service: self.service.to_string(),
                dependency: dependency.to_string(),
            }
            .into());
        }
        Ok(self.container.resolve::<T>(dependency)?)
    }
}

pub struct RegistrationBuilder<'a, T> {
    registration: &'a mut Registration,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> RegistrationBuilder<'_, T> {
    pub fn dependencies<I, S>(self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registration
            .dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Hands the `dir:file` config section to the factory.
    pub fn configure(self, key: &str) -> Self {
        self.registration.config_key = Some(key.to_string());
        self
    }

    pub fn singleton(self) -> Self {
        self.registration.singleton = true;
        self
    }
}

impl<T: Startable + 'static> RegistrationBuilder<'_, T> {
    pub fn startable(self) -> Self {
        let cast: StartableCast = Arc::new(|instance: AnyInstance| {
            instance
                .downcast::<T>()
                .ok()
                .map(|typed| typed as Arc<dyn Startable>)
        });
        self.registration.startable = Some(cast);
        self
    }
}

#[derive(Default)]
pub struct ServiceContainer {
    registrations: BTreeMap<String, Registration>,
    order: Vec<String>,
    config: Option<ConfigProvider>,
    instances: Mutex<HashMap<String, AnyInstance>>,
    resolving: Mutex<Vec<String>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ConfigProvider) -> Self {
        self.config = Some(config);
        self
    }

    pub fn set_config(&mut self, config: ConfigProvider) {
        self.config = Some(config);
    }

    /// Registers `factory` under `name`, replacing any earlier registration.
    pub fn register<T, F>(&mut self, name: &str, factory: F) -> RegistrationBuilder<'_, T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let registration = Registration {
            dependencies: Vec::new(),
            config_key: None,
            singleton: false,
            startable: None,
            factory: erase_factory(move |ctx| Ok(Arc::new(factory(ctx)?) as AnyInstance)),
        };

        let registration = match self.registrations.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(registration);
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                self.order.push(name.to_string());
                entry.insert(registration)
            }
        };
        RegistrationBuilder {
            registration,
            _marker: PhantomData,
        }
    }

    pub fn register_module(&mut self, module: &dyn ServiceModule) {
        log::debug!("Registering service module '{}'", module.name());
        module.register(self);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registrations.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn dependencies_of(&self, name: &str) -> Option<&[String]> {
        self.registrations
            .get(name)
            .map(|r| r.dependencies.as_slice())
    }

    /// Checks that every declared dependency is registered and that the graph has no
    /// cycles. Nothing is instantiated.
    pub fn validate_dependencies(&self) -> std::result::Result<(), ContainerError> {
        for name in &self.order {
            if let Some(registration) = self.registrations.get(name) {
                for dependency in &registration.dependencies {
                    if !self.registrations.contains_key(dependency) {
                        return Err(ContainerError::MissingDependency {
                            service: name.clone(),
                            dependency: dependency.clone(),
                        });
                    }
                }
            }
        }

        let mut finished = HashSet::new();
        for name in &self.order {
            let mut path = Vec::new();
            self.visit(name, &mut path, &mut finished)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        name: &str,
        path: &mut Vec<String>,
        finished: &mut HashSet<String>,
    ) -> std::result::Result<(), ContainerError> {
        if finished.contains(name) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|p| p == name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(ContainerError::Cycle(cycle));
        }

        path.push(name.to_string());
        if let Some(registration) = self.registrations.get(name) {
            for dependency in &registration.dependencies {
                self.visit(dependency, path, finished)?;
            }
        }
        path.pop();
        finished.insert(name.to_string());
        Ok(())
    }

    pub fn resolve<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> std::result::Result<Arc<T>, ContainerError> {
        self.resolve_any(name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch(name.to_string()))
    }

    pub fn resolve_startable(
        &self,
        name: &str,
    ) -> std::result::Result<Arc<dyn Startable>, ContainerError> {
        let cast = self
            .registrations
            .get(name)
            .ok_or_else(|| ContainerError::NotRegistered(name.to_string()))?
            .startable
            .clone()
            .ok_or_else(|| ContainerError::NotStartable(name.to_string()))?;

        cast(self.resolve_any(name)?).ok_or_else(|| ContainerError::TypeMismatch(name.to_string()))
    }

    fn resolve_any(&self, name: &str) -> std::result::Result<AnyInstance, ContainerError> {
        let registration = self
            .registrations
            .get(name)
            .ok_or_else(|| ContainerError::NotRegistered(name.to_string()))?;

        if registration.singleton {
            if let Some(instance) = self.cached(name)? {
                return Ok(instance);
            }
        }

        self.enter(name)?;
        let built = self.build(name, registration);
        self.leave(name)?;
        let instance = built?;

        if registration.singleton {
            let mut instances = self.instances.lock().map_err(|e| factory_error(name, e))?;
            let cached = instances
                .entry(name.to_string())
                .or_insert_with(|| Arc::clone(&instance));
            return Ok(Arc::clone(cached));
        }
        Ok(instance)
    }

    fn build(
        &self,
        name: &str,
        registration: &Registration,
    ) -> std::result::Result<AnyInstance, ContainerError> {
        let config = match (&registration.config_key, &self.config) {
            (Some(key), Some(provider)) => {
                provider.section(key).map_err(|e| factory_error(name, e))?
            }
            _ => JsonValue::Null,
        };

        let ctx = ResolveContext {
            container: self,
            service: name,
            dependencies: &registration.dependencies,
            config,
        };
        (registration.factory)(&ctx).map_err(|e| factory_error(name, e))
    }

    fn cached(&self, name: &str) -> std::result::Result<Option<AnyInstance>, ContainerError> {
        let instances = self.instances.lock().map_err(|e| factory_error(name, e))?;
        Ok(instances.get(name).cloned())
    }

    fn enter(&self, name: &str) -> std::result::Result<(), ContainerError> {
        let mut resolving = self.resolving.lock().map_err(|e| factory_error(name, e))?;
        if let Some(start) = resolving.iter().position(|r| r == name) {
            let mut cycle = resolving[start..].to_vec();
            cycle.push(name.to_string());
            return Err(ContainerError::Cycle(cycle));
        }
        resolving.push(name.to_string());
        Ok(())
    }

    fn leave(&self, name: &str) -> std::result::Result<(), ContainerError> {
        let mut resolving = self.resolving.lock().map_err(|e| factory_error(name, e))?;
        if let Some(idx) = resolving.iter().rposition(|r| r == name) {
            resolving.remove(idx);
        }
        Ok(())
    }
}

fn erase_factory<F>(factory: F) -> Factory
where
    F: Fn(&ResolveContext<'_>) -> Result<AnyInstance> + Send + Sync + 'static,
{
    Arc::new(factory)
}

fn factory_error(service: &str, err: impl std::fmt::Display) -> ContainerError {
    ContainerError::Factory {
        service: service.to_string(),
        message: err.to_string(),
    }
}
