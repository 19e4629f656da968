use tracing::{Level, event};

use crate::core::{ColumnSpec, ColumnType, Result, TableSpec};
use crate::dialect::Dialect;
use crate::migration::{MigrationOutcome, MigrationStep, TableMigration};

pub const CORRELATION: &str = "correlation";
pub const EXTERNAL_TASK: &str = "external_task";
pub const FLOW_NODE_INSTANCE: &str = "flow_node_instance";
pub const PROCESS_MODEL: &str = "process_model";

/// Repositories in the order their migrations run.
pub const REPOSITORIES: [&str; 4] = [CORRELATION, EXTERNAL_TASK, FLOW_NODE_INSTANCE, PROCESS_MODEL];

/// Migration chain of one repository table.
#[derive(Debug, Clone)]
pub struct RepositoryMigration {
    pub repository: String,
    pub table: String,
    pub staging: String,
    /// Current shape, created as-is on a fresh store.
    pub schema: TableSpec,
    pub steps: Vec<MigrationStep>,
}

impl RepositoryMigration {
    pub fn new(repository: &str, staging: &str, schema: TableSpec) -> Self {
        Self {
            repository: repository.to_string(),
            table: schema.name.clone(),
            staging: staging.to_string(),
            schema,
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: MigrationStep) -> Result<Self> {
        step.validate()?;
        self.steps.push(step);
        Ok(self)
    }

    /// Brings the repository table to its current shape.
    ///
    /// A store that has neither the table nor a staging table gets the current shape
    /// directly; otherwise every step runs in version order.
    pub async fn apply(&self, dialect: &dyn Dialect) -> Result<Vec<MigrationOutcome>> {
        if !dialect.table_exists(&self.table).await?
            && !dialect.table_exists(&self.staging).await?
        {
            event!(Level::INFO, table = %self.table, "creating table on empty store");
            dialect.create_table(&self.schema).await?;
            return Ok(vec![MigrationOutcome::Created]);
        }

        let mut outcomes = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let migration = TableMigration::new(&self.table, &self.staging, step.clone());
            outcomes.push(migration.run(dialect).await?);
        }
        Ok(outcomes)
    }
}

/// The repositories and their chains, in run order.
pub fn repository_migrations() -> Result<Vec<RepositoryMigration>> {
    Ok(vec![
        surrogate_key_migration(CORRELATION, "correlations_new", correlations(), "correlationEntryId")?,
        surrogate_key_migration(EXTERNAL_TASK, "external_tasks_new", external_tasks(), "externalTaskId")?,
        surrogate_key_migration(
            FLOW_NODE_INSTANCE,
            "flow_node_instances_new",
            flow_node_instances(),
            "flowNodeInstanceId",
        )?,
        surrogate_key_migration(
            PROCESS_MODEL,
            "process_definitions_new",
            process_definitions(),
            "processDefinitionId",
        )?,
    ])
}

/// Version 2 of every repository: the string id becomes an integer surrogate key and the
/// old id moves into `id_column`.
fn surrogate_key_migration(
    repository: &str,
    staging: &str,
    schema: TableSpec,
    id_column: &str,
) -> Result<RepositoryMigration> {
    let step = MigrationStep::new(2, schema.clone(), "id", ColumnType::Integer)
        .with_rename(id_column, "id")
        .with_order_column("createdAt");
    RepositoryMigration::new(repository, staging, schema).with_step(step)
}

fn string(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnType::String)
}

fn text(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnType::Text)
}

fn date(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnType::Date)
}

fn timestamps(spec: TableSpec) -> TableSpec {
    spec.column(date("createdAt")).column(date("updatedAt"))
}

pub fn correlations() -> TableSpec {
    timestamps(
        TableSpec::new("Correlations")
            .column(ColumnSpec::surrogate_key("id"))
            .column(string("correlationEntryId"))
            .column(string("correlationId").not_null())
            .column(string("processInstanceId"))
            .column(string("parentProcessInstanceId"))
            .column(string("processModelId"))
            .column(text("processModelHash").not_null())
            .column(text("identity"))
            .column(string("state").not_null().default_value("finished"))
            .column(text("error")),
    )
}

pub fn external_tasks() -> TableSpec {
    timestamps(
        TableSpec::new("ExternalTasks")
            .column(ColumnSpec::surrogate_key("id"))
            .column(string("externalTaskId"))
            .column(string("workerId"))
            .column(string("topic").not_null())
            .column(string("flowNodeInstanceId").not_null())
            .column(string("correlationId").not_null())
            .column(string("processModelId"))
            .column(string("processInstanceId").not_null())
            .column(date("lockExpirationTime"))
            .column(text("identity").not_null())
            .column(text("payload"))
            .column(string("state").not_null().default_value("pending"))
            .column(date("finishedAt"))
            .column(text("result"))
            .column(text("error"))
            .column(ColumnSpec::new("version", ColumnType::Integer)),
    )
}

pub fn flow_node_instances() -> TableSpec {
    timestamps(
        TableSpec::new("FlowNodeInstances")
            .column(ColumnSpec::surrogate_key("id"))
            .column(string("flowNodeInstanceId"))
            .column(string("flowNodeId").not_null())
            .column(string("flowNodeType"))
            .column(string("eventType"))
            .column(string("correlationId"))
            .column(string("processModelId"))
            .column(string("processInstanceId"))
            .column(string("parentProcessInstanceId"))
            .column(text("identity"))
            .column(string("state").not_null().default_value("finished"))
            .column(text("error"))
            .column(string("previousFlowNodeInstanceId")),
    )
}

pub fn process_definitions() -> TableSpec {
    timestamps(
        TableSpec::new("ProcessDefinitions")
            .column(ColumnSpec::surrogate_key("id"))
            .column(string("processDefinitionId"))
            .column(string("name").not_null())
            .column(text("xml").not_null())
            .column(text("hash").not_null())
            .column(text("identity")),
    )
}

/// Version 1 shape of a repository table: string primary key, no surrogate.
pub fn legacy_schema(repository: &str) -> Option<TableSpec> {
    let (current, id_column) = match repository {
        CORRELATION => (correlations(), "correlationEntryId"),
        EXTERNAL_TASK => (external_tasks(), "externalTaskId"),
        FLOW_NODE_INSTANCE => (flow_node_instances(), "flowNodeInstanceId"),
        PROCESS_MODEL => (process_definitions(), "processDefinitionId"),
        _ => return None,
    };

    let mut legacy = TableSpec::new(&current.name);
    for column in current.columns {
        if column.name == id_column {
            continue;
        }
        if column.auto_increment {
            let mut id = ColumnSpec::new(&column.name, ColumnType::String).not_null();
            id.primary_key = true;
            legacy = legacy.column(id);
        } else {
            legacy = legacy.column(column);
        }
    }
    Some(legacy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repositories_run_in_fixed_order() {
        let migrations = repository_migrations().unwrap();
        let names: Vec<&str> = migrations.iter().map(|m| m.repository.as_str()).collect();
        assert_eq!(names, REPOSITORIES);
    }

    #[test]
    fn test_every_chain_ends_at_current_schema() {
        for migration in repository_migrations().unwrap() {
            let last = migration.steps.last().unwrap();
            assert_eq!(last.target, migration.schema);
            assert!(migration.staging.ends_with("_new"));
        }
    }

    #[test]
    fn test_external_task_keeps_old_id() {
        let migrations = repository_migrations().unwrap();
        let external = &migrations[1];
        assert_eq!(external.table, "ExternalTasks");
        assert_eq!(
            external.steps[0].renames,
            vec![("externalTaskId".to_string(), "id".to_string())]
        );
        let state = external.schema.find_column("state").unwrap();
        assert!(!state.nullable);
        assert!(state.is_omittable());
    }

    #[test]
    fn test_legacy_schema_has_string_key() {
        let legacy = legacy_schema(EXTERNAL_TASK).unwrap();
        let id = legacy.find_column("id").unwrap();
        assert_eq!(id.column_type, ColumnType::String);
        assert!(id.primary_key);
        assert!(legacy.find_column("externalTaskId").is_none());
        assert!(legacy_schema("unknown").is_none());
    }
}
