use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Table '{0}' does not exist")]
    SchemaUnavailable(String),

    #[error("Migration of repository '{repository}' failed: {message}")]
    MigrationFailure { repository: String, message: String },

    #[error("Dependency resolution error: {0}")]
    DependencyResolution(String),

    #[error("Service '{service}' failed to start: {message}")]
    ServiceStart { service: String, message: String },

    #[error("Resumption error: {0}")]
    Resumption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl BootstrapError {
    /// Whether this error must stop the process before it starts serving.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ServiceStart { .. } | Self::Resumption(_))
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

impl<T> From<std::sync::PoisonError<T>> for BootstrapError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for BootstrapError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for BootstrapError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(format!("sqlite: {}", err))
    }
}

impl From<tokio_postgres::Error> for BootstrapError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Storage(format!("postgres: {}", err))
    }
}

impl From<serde_json::Error> for BootstrapError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("invalid JSON: {}", err))
    }
}

impl From<tokio::task::JoinError> for BootstrapError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("blocking task failed: {}", err))
    }
}
