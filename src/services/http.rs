use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use axum::Router;
use axum::extract::Request;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower::service_fn;
use tower_http::trace::TraceLayer;

use crate::container::Startable;
use crate::core::{BootstrapError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    #[serde(deserialize_with = "crate::config::provider::port_number")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// `http/http_extension.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub server: ServerSettings,
}

/// HTTP listener whose routes can still be extended after it started serving.
pub struct HttpExtension {
    settings: HttpSettings,
    routes: Arc<RwLock<Router>>,
    local_addr: Mutex<Option<SocketAddr>>,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl HttpExtension {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings,
            routes: Arc::new(RwLock::new(Router::new())),
            local_addr: Mutex::new(None),
            server: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Adds `routes` to what is served; visible to the next request.
    pub fn merge_routes(&self, routes: Router) -> Result<()> {
        let mut current = self.routes.write()?;
        let merged = std::mem::take(&mut *current).merge(routes);
        *current = merged;
        Ok(())
    }

    /// Router that dispatches every request to the current route set.
    pub fn router(&self) -> Router {
        let routes = Arc::clone(&self.routes);
        let dispatch = service_fn(move |request: Request| {
            let current = match routes.read() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            async move { current.oneshot(request).await }
        });

        Router::new()
            .fallback_service(dispatch)
            .layer(TraceLayer::new_for_http())
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|addr| *addr)
    }

    pub fn is_running(&self) -> bool {
        self.server
            .lock()
            .map(|handle| handle.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    pub fn stop(&self) {
        if let Ok(mut server) = self.server.lock() {
            if let Some(handle) = server.take() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Startable for HttpExtension {
    async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let bind = format!("{}:{}", self.settings.server.host, self.settings.server.port);
        let listener = TcpListener::bind(&bind).await.map_err(|e| {
            BootstrapError::Io(format!("failed to bind HTTP listener on {}: {}", bind, e))
        })?;
        let addr = listener.local_addr()?;

        let app = self.router();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("HTTP server on {} stopped: {}", addr, e);
            }
        });

        *self.local_addr.lock()? = Some(addr);
        *self.server.lock()? = Some(handle);
        log::info!("HTTP extension listening on {}", addr);
        Ok(())
    }
}

impl Drop for HttpExtension {
    fn drop(&mut self) {
        self.stop();
    }
}
