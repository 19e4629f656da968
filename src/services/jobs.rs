use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::container::Startable;
use crate::core::{BootstrapError, Result};
use crate::services::HttpExtension;

pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Named unit of work run by [`AutoStartService`] or [`CronjobService`].
#[derive(Clone)]
pub struct Job {
    pub name: String,
    run: JobFn,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}

impl Job {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(move || -> BoxFuture<'static, Result<()>> { Box::pin(run()) }),
        }
    }

    pub async fn run(&self) -> Result<()> {
        (self.run)().await
    }
}

/// Brings up the application's serving surface.
pub struct AppBootstrapper {
    http: Arc<HttpExtension>,
}

impl AppBootstrapper {
    pub fn new(http: Arc<HttpExtension>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Startable for AppBootstrapper {
    async fn start(&self) -> Result<()> {
        info!("Starting application");
        self.http.start().await
    }
}

/// Runs each of its jobs once at startup.
#[derive(Debug, Default)]
pub struct AutoStartService {
    jobs: Vec<Job>,
}

impl AutoStartService {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl Startable for AutoStartService {
    /// Every job runs even if an earlier one failed; the first failure is returned.
    async fn start(&self) -> Result<()> {
        let mut first_failure = None;
        for job in &self.jobs {
            if let Err(e) = job.run().await {
                error!("Auto-start job '{}' failed: {}", job.name, e);
                first_failure.get_or_insert(BootstrapError::ServiceStart {
                    service: job.name.clone(),
                    message: e.to_string(),
                });
            }
        }
        first_failure.map_or(Ok(()), Err)
    }
}

#[derive(Debug, Clone)]
pub struct Cronjob {
    pub job: Job,
    pub every: Duration,
}

/// Runs jobs on fixed intervals until stopped.
#[derive(Debug, Default)]
pub struct CronjobService {
    cronjobs: Vec<Cronjob>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl CronjobService {
    pub fn new(cronjobs: Vec<Cronjob>) -> Self {
        Self {
            cronjobs,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn running(&self) -> usize {
        self.handles
            .lock()
            .map(|handles| handles.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    pub fn stop(&self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Startable for CronjobService {
    async fn start(&self) -> Result<()> {
        if let Some(cronjob) = self.cronjobs.iter().find(|c| c.every.is_zero()) {
            return Err(BootstrapError::ServiceStart {
                service: cronjob.job.name.clone(),
                message: "cronjob interval must be greater than zero".to_string(),
            });
        }

        let mut handles = self.handles.lock()?;
        if !handles.is_empty() {
            debug!("Cronjobs already scheduled");
            return Ok(());
        }
        for cronjob in &self.cronjobs {
            let Cronjob { job, every } = cronjob.clone();
            info!("Scheduling cronjob '{}' every {:?}", job.name, every);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if let Err(e) = job.run().await {
                        error!("Cronjob '{}' failed: {}", job.name, e);
                    }
                }
            }));
        }
        Ok(())
    }
}

impl Drop for CronjobService {
    fn drop(&mut self) {
        self.stop();
    }
}
