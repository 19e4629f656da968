//! Core runtime services and the module that registers them.

pub mod http;
pub mod jobs;
pub mod module;

pub use http::{HttpExtension, HttpSettings, ServerSettings};
pub use jobs::{AppBootstrapper, AutoStartService, Cronjob, CronjobService, Job};
pub use module::RuntimeModule;

pub const HTTP_EXTENSION: &str = "HttpExtension";
pub const APP_BOOTSTRAPPER: &str = "AppBootstrapper";
pub const AUTO_START_SERVICE: &str = "AutoStartService";
pub const CRONJOB_SERVICE: &str = "CronjobService";
pub const RESUME_PROCESS_SERVICE: &str = "ResumeProcessService";

/// Started after the application, each on its own.
pub const AUTO_START_SERVICES: [&str; 2] = [AUTO_START_SERVICE, CRONJOB_SERVICE];
