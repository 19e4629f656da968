use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};

use crate::config::PostgresSettings;
use crate::core::{
    BootstrapError, ColumnDescriptor, ColumnType, Result, Row, SchemaDescriptor, TableSpec, Value,
};
use crate::dialect::{Dialect, DialectKind, sql};

const DESCRIBE_COLUMNS: &str = "SELECT c.column_name::text, c.data_type::text, c.is_nullable::text, \
     c.column_default::text, \
     EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
              AND tc.table_name = kcu.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = c.table_schema \
               AND tc.table_name = c.table_name \
               AND kcu.column_name = c.column_name) AS is_primary \
     FROM information_schema.columns c \
     WHERE c.table_schema = current_schema() AND c.table_name = $1 \
     ORDER BY c.ordinal_position";

const TABLE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1)";

/// Client-server store.
pub struct PostgresDialect {
    client: Client,
}

impl PostgresDialect {
    pub async fn connect(settings: &PostgresSettings) -> Result<Self> {
        let (client, connection) =
            tokio_postgres::connect(&settings.connection_string(), NoTls).await?;

        let target = settings.redacted();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("Connection to {} closed with error: {}", target, e);
            }
        });

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn query_rows(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
        let bound: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(statement, &bound).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Row::new();
            for (idx, column) in row.columns().iter().enumerate() {
                record.insert(column.name().to_string(), decode(row, idx, column.type_())?);
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn decode(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<Value> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Boolean),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::Integer(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::Integer(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Integer),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(Value::Timestamp),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|naive| Value::Timestamp(naive.and_utc())),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Blob),
        _ => {
            return Err(BootstrapError::Storage(format!(
                "postgres: unsupported column type '{}' at position {}",
                ty, idx
            )));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

fn describe_row(row: &tokio_postgres::Row) -> Result<(String, ColumnDescriptor)> {
    let name: String = row.try_get(0)?;
    let declared_type: String = row.try_get(1)?;
    let is_nullable: String = row.try_get(2)?;
    let default: Option<String> = row.try_get(3)?;
    let primary_key: bool = row.try_get(4)?;

    Ok((
        name,
        ColumnDescriptor {
            column_type: ColumnType::from_declared(&declared_type),
            declared_type,
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
            default,
            primary_key,
        },
    ))
}

#[async_trait]
impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = self.client.query_one(TABLE_EXISTS, &[&table]).await?;
        Ok(row.try_get(0)?)
    }

    async fn describe(&self, table: &str) -> Result<Option<SchemaDescriptor>> {
        let rows = self.client.query(DESCRIBE_COLUMNS, &[&table]).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut schema = SchemaDescriptor::new(table);
        for row in &rows {
            let (name, descriptor) = describe_row(row)?;
            schema.push(&name, descriptor);
        }
        Ok(Some(schema))
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<()> {
        self.client
            .batch_execute(&sql::create_table(DialectKind::Postgres, spec))
            .await?;
        Ok(())
    }

    async fn insert_row(&self, table: &str, columns: &[String], values: &[Value]) -> Result<()> {
        let statement = sql::insert_row(DialectKind::Postgres, table, columns);
        let bound: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        self.client.execute(statement.as_str(), &bound).await?;
        Ok(())
    }

    async fn drop_table_if_exists(&self, table: &str) -> Result<()> {
        self.client
            .batch_execute(&sql::drop_table_if_exists(table))
            .await?;
        Ok(())
    }

    async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        self.client
            .batch_execute(&sql::rename_table(from, to))
            .await?;
        Ok(())
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Row>> {
        self.query_rows(&sql::select_all(DialectKind::Postgres, table), &[])
            .await
    }

    async fn select_in_insertion_order(
        &self,
        table: &str,
        created_column: Option<&str>,
    ) -> Result<Vec<Row>> {
        self.query_rows(
            &sql::select_in_insertion_order(DialectKind::Postgres, table, created_column),
            &[],
        )
        .await
    }

    async fn select_where_eq(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>> {
        self.query_rows(
            &sql::select_where_eq(DialectKind::Postgres, table, column),
            std::slice::from_ref(value),
        )
        .await
    }
}
