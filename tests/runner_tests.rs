mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{MemoryConnector, sqlite_stores, text_columns};
use processengine_runtime::core::{BootstrapError, Value};
use processengine_runtime::dialect::{Dialect, SqliteDialect};
use processengine_runtime::migration::registry::{
    CORRELATION, EXTERNAL_TASK, FLOW_NODE_INSTANCE, PROCESS_MODEL,
};
use processengine_runtime::migration::{
    MigrationOutcome, MigrationRunner, REPOSITORIES, legacy_schema, repository_migrations,
};
use tempfile::TempDir;

async fn seed_legacy_correlation(db: &SqliteDialect) {
    db.create_table(&legacy_schema(CORRELATION).unwrap())
        .await
        .unwrap();
    db.insert_row(
        "Correlations",
        &text_columns(&["id", "correlationId", "processInstanceId", "processModelHash", "state"]),
        &[
            Value::from("c-1"),
            Value::from("corr-1"),
            Value::from("pi-1"),
            Value::from("hash"),
            Value::from("finished"),
        ],
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_repositories_run_in_order_without_overlap() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MemoryConnector::default());
    seed_legacy_correlation(&connector.store(CORRELATION)).await;
    connector
        .store(PROCESS_MODEL)
        .create_table(&legacy_schema(PROCESS_MODEL).unwrap())
        .await
        .unwrap();

    let runner = MigrationRunner::new(connector.clone(), repository_migrations().unwrap());
    assert_eq!(runner.repositories(), REPOSITORIES.to_vec());

    let report = runner.run(&sqlite_stores(dir.path())).await.unwrap();

    assert_eq!(connector.connects(), REPOSITORIES.to_vec());
    let names: Vec<&str> = report.repositories.iter().map(|r| r.repository.as_str()).collect();
    assert_eq!(names, REPOSITORIES.to_vec());
    for pair in report.repositories.windows(2) {
        assert!(pair[0].finished_at <= pair[1].started_at);
    }

    assert_eq!(
        report.get(CORRELATION).unwrap().outcomes,
        vec![MigrationOutcome::Migrated { rows: 1 }]
    );
    assert_eq!(
        report.get(EXTERNAL_TASK).unwrap().outcomes,
        vec![MigrationOutcome::Created]
    );
    assert_eq!(
        report.get(PROCESS_MODEL).unwrap().outcomes,
        vec![MigrationOutcome::Migrated { rows: 0 }]
    );

    let rows = connector.store(CORRELATION).select_all("Correlations").await.unwrap();
    assert_eq!(rows[0]["id"], Value::Integer(1));
    assert_eq!(rows[0]["correlationEntryId"], Value::from("c-1"));
}

#[tokio::test]
async fn test_rerun_reports_every_repository_up_to_date() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MemoryConnector::default());
    seed_legacy_correlation(&connector.store(CORRELATION)).await;
    let stores = sqlite_stores(dir.path());

    let runner = MigrationRunner::new(connector.clone(), repository_migrations().unwrap());
    runner.run(&stores).await.unwrap();
    let report = runner.run(&stores).await.unwrap();

    for repository in REPOSITORIES {
        assert_eq!(
            report.get(repository).unwrap().outcomes,
            vec![MigrationOutcome::UpToDate],
            "{}",
            repository
        );
    }
}

#[tokio::test]
async fn test_first_failure_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let connector = Arc::new(MemoryConnector::failing_for(FLOW_NODE_INSTANCE));

    let runner = MigrationRunner::new(connector.clone(), repository_migrations().unwrap());
    let err = runner.run(&sqlite_stores(dir.path())).await.unwrap_err();

    match &err {
        BootstrapError::MigrationFailure { repository, message } => {
            assert_eq!(repository, FLOW_NODE_INSTANCE);
            assert!(message.contains("unreachable"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_fatal());

    // The process model store was never opened.
    assert_eq!(
        connector.connects(),
        vec![CORRELATION, EXTERNAL_TASK, FLOW_NODE_INSTANCE]
    );
}

#[tokio::test]
async fn test_missing_store_configuration_is_a_configuration_error() {
    let connector = Arc::new(MemoryConnector::default());
    let runner = MigrationRunner::new(connector.clone(), repository_migrations().unwrap());

    let err = runner.run(&BTreeMap::new()).await.unwrap_err();
    assert!(matches!(err, BootstrapError::Configuration(ref m) if m.contains(CORRELATION)));
    assert!(connector.connects().is_empty());
}

#[tokio::test]
async fn test_sqlite_files_are_migrated_in_place() {
    let dir = TempDir::new().unwrap();
    let stores = sqlite_stores(dir.path());
    let path = dir.path().join(format!("{}.sqlite", CORRELATION));
    seed_legacy_correlation(&SqliteDialect::open(&path).unwrap()).await;

    let runner = MigrationRunner::new(
        Arc::new(processengine_runtime::NativeConnector),
        repository_migrations().unwrap(),
    );
    let report = runner.run(&stores).await.unwrap();
    assert_eq!(
        report.get(CORRELATION).unwrap().outcomes,
        vec![MigrationOutcome::Migrated { rows: 1 }]
    );

    let reopened = SqliteDialect::open(&path).unwrap();
    let rows = reopened.select_all("Correlations").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["correlationEntryId"], Value::from("c-1"));
    assert!(!reopened.table_exists("correlations_new").await.unwrap());
}
