//! Resuming process instances interrupted by a previous shutdown or crash.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::RepositoryStoreConfig;
use crate::core::{BootstrapError, Result, Row, Value};
use crate::dialect::StoreConnector;
use crate::migration::registry::CORRELATION;

/// Correlation state of process instances that were still executing.
pub const RUNNING_STATE: &str = "running";
pub const CORRELATIONS_TABLE: &str = "Correlations";

/// Identity used for work the runtime itself triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemIdentity {
    pub token: String,
    pub user_id: String,
}

impl Default for SystemIdentity {
    fn default() -> Self {
        Self {
            token: "ZHVtbXlfdG9rZW4=".to_string(),
            user_id: "dummy_token".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightWorkItem {
    pub process_instance_id: String,
    pub process_model_id: Option<String>,
    pub correlation_id: String,
    pub identity: Option<String>,
}

impl InFlightWorkItem {
    fn from_row(row: &Row) -> Option<Self> {
        let text = |column: &str| row.get(column).and_then(Value::to_text);
        Some(Self {
            process_instance_id: text("processInstanceId")?,
            correlation_id: text("correlationId")?,
            process_model_id: text("processModelId"),
            identity: text("identity"),
        })
    }
}

#[async_trait]
pub trait InFlightWorkSource: Send + Sync {
    async fn find_in_flight(&self) -> Result<Vec<InFlightWorkItem>>;
}

/// The process execution engine, as far as recovery is concerned.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn resume(&self, identity: &SystemIdentity, item: &InFlightWorkItem) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumptionReport {
    pub found: usize,
    pub resumed: usize,
    pub failed: usize,
}

pub struct RecoveryResumer {
    source: Arc<dyn InFlightWorkSource>,
    engine: Arc<dyn ExecutionEngine>,
    identity: SystemIdentity,
}

impl RecoveryResumer {
    pub fn new(source: Arc<dyn InFlightWorkSource>, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            source,
            engine,
            identity: SystemIdentity::default(),
        }
    }

    pub fn identity(&self) -> &SystemIdentity {
        &self.identity
    }

    /// Asks the engine to resume everything that is in flight right now.
    ///
    /// Failing to list the items is an error; failing to resume one item is logged and
    /// counted, and the remaining items are still attempted.
    pub async fn resume_interrupted(&self) -> Result<ResumptionReport> {
        let items = self
            .source
            .find_in_flight()
            .await
            .map_err(|e| BootstrapError::Resumption(format!("listing in-flight work: {}", e)))?;

        let mut report = ResumptionReport {
            found: items.len(),
            ..Default::default()
        };
        if items.is_empty() {
            info!("No interrupted process instances found");
            return Ok(report);
        }

        info!("Resuming {} interrupted process instances", items.len());
        for item in &items {
            match self.engine.resume(&self.identity, item).await {
                Ok(()) => report.resumed += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "Failed to resume process instance {}: {}",
                        item.process_instance_id, e
                    );
                }
            }
        }
        Ok(report)
    }
}

/// Reads in-flight items from the correlation store.
pub struct SqlInFlightWorkSource {
    connector: Arc<dyn StoreConnector>,
    store: RepositoryStoreConfig,
}

impl SqlInFlightWorkSource {
    pub fn new(connector: Arc<dyn StoreConnector>, store: RepositoryStoreConfig) -> Self {
        Self { connector, store }
    }
}

#[async_trait]
impl InFlightWorkSource for SqlInFlightWorkSource {
    async fn find_in_flight(&self) -> Result<Vec<InFlightWorkItem>> {
        let dialect = self.connector.connect(CORRELATION, &self.store).await?;
        let rows = dialect
            .select_where_eq(CORRELATIONS_TABLE, "state", &Value::from(RUNNING_STATE))
            .await?;

        // One correlation row per process instance and state change; resume each instance once.
        let mut seen = BTreeSet::new();
        let mut items = Vec::new();
        for row in &rows {
            match InFlightWorkItem::from_row(row) {
                Some(item) => {
                    if seen.insert(item.process_instance_id.clone()) {
                        items.push(item);
                    }
                }
                None => warn!("Skipping running correlation without process instance id"),
            }
        }
        Ok(items)
    }
}

/// Resume request handed to whatever drives process execution.
#[derive(Debug)]
pub struct ResumeRequest {
    pub request_id: Uuid,
    pub identity: SystemIdentity,
    pub item: InFlightWorkItem,
    pub reply: oneshot::Sender<Result<()>>,
}

/// [`ExecutionEngine`] that forwards each request over a channel and waits for the reply.
#[derive(Clone)]
pub struct ChannelEngine {
    sender: mpsc::Sender<ResumeRequest>,
}

impl ChannelEngine {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ResumeRequest>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ExecutionEngine for ChannelEngine {
    async fn resume(&self, identity: &SystemIdentity, item: &InFlightWorkItem) -> Result<()> {
        let (reply, response) = oneshot::channel();
        let request = ResumeRequest {
            request_id: Uuid::new_v4(),
            identity: identity.clone(),
            item: item.clone(),
            reply,
        };

        self.sender.send(request).await.map_err(|_| {
            BootstrapError::Resumption("execution engine is not accepting requests".to_string())
        })?;
        response.await.map_err(|_| {
            BootstrapError::Resumption(format!(
                "execution engine dropped the request for {}",
                item.process_instance_id
            ))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryStoreConfig;
    use crate::dialect::NativeConnector;
    use crate::migration::registry::correlations;
    use std::sync::Mutex;

    struct FixedSource(Vec<InFlightWorkItem>);

    #[async_trait]
    impl InFlightWorkSource for FixedSource {
        async fn find_in_flight(&self) -> Result<Vec<InFlightWorkItem>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl InFlightWorkSource for FailingSource {
        async fn find_in_flight(&self) -> Result<Vec<InFlightWorkItem>> {
            Err(BootstrapError::Storage("gone".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingEngine {
        calls: Mutex<Vec<(String, String)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl ExecutionEngine for RecordingEngine {
        async fn resume(&self, identity: &SystemIdentity, item: &InFlightWorkItem) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((identity.user_id.clone(), item.process_instance_id.clone()));
            if self.fail_on.as_deref() == Some(item.process_instance_id.as_str()) {
                return Err(BootstrapError::Storage("engine refused".to_string()));
            }
            Ok(())
        }
    }

    fn item(id: &str) -> InFlightWorkItem {
        InFlightWorkItem {
            process_instance_id: id.to_string(),
            process_model_id: Some("model".to_string()),
            correlation_id: format!("corr-{}", id),
            identity: None,
        }
    }

    #[tokio::test]
    async fn test_per_item_failures_are_counted_not_fatal() {
        let engine = Arc::new(RecordingEngine {
            fail_on: Some("b".to_string()),
            ..Default::default()
        });
        let resumer = RecoveryResumer::new(
            Arc::new(FixedSource(vec![item("a"), item("b"), item("c")])),
            engine.clone(),
        );

        let report = resumer.resume_interrupted().await.unwrap();
        assert_eq!(
            report,
            ResumptionReport {
                found: 3,
                resumed: 2,
                failed: 1
            }
        );

        let calls = engine.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(user, _)| user == "dummy_token"));
    }

    #[tokio::test]
    async fn test_listing_failure_is_resumption_error() {
        let resumer =
            RecoveryResumer::new(Arc::new(FailingSource), Arc::new(RecordingEngine::default()));
        let err = resumer.resume_interrupted().await.unwrap_err();
        assert!(matches!(err, BootstrapError::Resumption(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_sql_source_reads_running_correlations_once_per_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            RepositoryStoreConfig::sqlite(dir.path().join("correlation.sqlite").display().to_string());
        let dialect = NativeConnector.connect(CORRELATION, &store).await.unwrap();
        dialect.create_table(&correlations()).await.unwrap();

        let columns: Vec<String> = ["correlationId", "processInstanceId", "processModelHash", "state"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        for (correlation, instance, state) in [
            ("c1", "pi-1", "running"),
            ("c1", "pi-1", "running"),
            ("c2", "pi-2", "finished"),
            ("c3", "pi-3", "running"),
        ] {
            dialect
                .insert_row(
                    CORRELATIONS_TABLE,
                    &columns,
                    &[
                        Value::from(correlation),
                        Value::from(instance),
                        Value::from("hash"),
                        Value::from(state),
                    ],
                )
                .await
                .unwrap();
        }

        let source = SqlInFlightWorkSource::new(Arc::new(NativeConnector), store);
        let items = source.find_in_flight().await.unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.process_instance_id.as_str()).collect();
        assert_eq!(ids, vec!["pi-1", "pi-3"]);
        assert_eq!(items[0].process_model_id, None);
    }

    #[tokio::test]
    async fn test_channel_engine_round_trip() {
        let (engine, mut requests) = ChannelEngine::new(4);
        let worker = tokio::spawn(async move {
            let mut handled = Vec::new();
            while let Some(request) = requests.recv().await {
                handled.push(request.item.process_instance_id.clone());
                let _ = request.reply.send(Ok(()));
            }
            handled
        });

        engine
            .resume(&SystemIdentity::default(), &item("x"))
            .await
            .unwrap();
        drop(engine);

        assert_eq!(worker.await.unwrap(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_channel_engine_reports_closed_receiver() {
        let (engine, requests) = ChannelEngine::new(1);
        drop(requests);
        let err = engine
            .resume(&SystemIdentity::default(), &item("y"))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Resumption(_)));
    }
}
