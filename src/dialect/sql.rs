//! Statement text for the primitive operations, per dialect.
//!
//! Only identifiers and DDL defaults are ever rendered into statement text; row
//! values always travel as bound parameters.

use crate::core::{ColumnSpec, ColumnType, TableSpec, Value};
use crate::dialect::DialectKind;

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn placeholder(kind: DialectKind, index: usize) -> String {
    match kind {
        DialectKind::Sqlite => format!("?{}", index),
        DialectKind::Postgres => format!("${}", index),
    }
}

fn column_type_sql(kind: DialectKind, column_type: &ColumnType) -> String {
    match (kind, column_type) {
        (_, ColumnType::Integer) => "INTEGER".to_string(),
        (_, ColumnType::String) => "VARCHAR(255)".to_string(),
        (_, ColumnType::Text) => "TEXT".to_string(),
        (DialectKind::Sqlite, ColumnType::Date) => "DATETIME".to_string(),
        (DialectKind::Postgres, ColumnType::Date) => "TIMESTAMP WITH TIME ZONE".to_string(),
        (DialectKind::Sqlite, ColumnType::Boolean) => "TINYINT(1)".to_string(),
        (DialectKind::Postgres, ColumnType::Boolean) => "BOOLEAN".to_string(),
        (DialectKind::Sqlite, ColumnType::Float) => "REAL".to_string(),
        (DialectKind::Postgres, ColumnType::Float) => "DOUBLE PRECISION".to_string(),
        (DialectKind::Sqlite, ColumnType::Blob) => "BLOB".to_string(),
        (DialectKind::Postgres, ColumnType::Blob) => "BYTEA".to_string(),
        (_, ColumnType::Other(raw)) => raw.clone(),
    }
}

fn default_sql(kind: DialectKind, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => quote_literal(s),
        Value::Boolean(b) => match kind {
            DialectKind::Sqlite => i64::from(*b).to_string(),
            DialectKind::Postgres => if *b { "TRUE" } else { "FALSE" }.to_string(),
        },
        Value::Timestamp(ts) => quote_literal(&ts.to_rfc3339()),
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            match kind {
                DialectKind::Sqlite => format!("X'{}'", hex),
                DialectKind::Postgres => format!("'\\x{}'::bytea", hex),
            }
        }
    }
}

fn column_definition(kind: DialectKind, column: &ColumnSpec) -> String {
    let name = quote_ident(&column.name);

    if column.auto_increment {
        return match kind {
            DialectKind::Sqlite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name),
            DialectKind::Postgres => format!("{} SERIAL PRIMARY KEY", name),
        };
    }

    let mut definition = format!("{} {}", name, column_type_sql(kind, &column.column_type));
    if column.primary_key {
        definition.push_str(" PRIMARY KEY");
    }
    if !column.nullable {
        definition.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        definition.push_str(" DEFAULT ");
        definition.push_str(&default_sql(kind, default));
    }
    definition
}

pub fn create_table(kind: DialectKind, spec: &TableSpec) -> String {
    let columns = spec
        .columns
        .iter()
        .map(|column| column_definition(kind, column))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(&spec.name), columns)
}

pub fn insert_row(kind: DialectKind, table: &str, columns: &[String]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
    }

    let names = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| placeholder(kind, i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names,
        placeholders
    )
}

pub fn drop_table_if_exists(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

pub fn rename_table(from: &str, to: &str) -> String {
    format!("ALTER TABLE {} RENAME TO {}", quote_ident(from), quote_ident(to))
}

pub fn select_all(kind: DialectKind, table: &str) -> String {
    match kind {
        // rowid follows insertion order for ordinary tables.
        DialectKind::Sqlite => format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table)),
        DialectKind::Postgres => format!("SELECT * FROM {}", quote_ident(table)),
    }
}

/// All rows, oldest insert first.
///
/// SQLite orders by `rowid`, which updates never move. PostgreSQL has no such id and an
/// update relocates the tuple, so rows are ordered by the write-once `created_column`
/// with `ctid` breaking ties.
pub fn select_in_insertion_order(
    kind: DialectKind,
    table: &str,
    created_column: Option<&str>,
) -> String {
    match (kind, created_column) {
        (DialectKind::Sqlite, _) => select_all(kind, table),
        (DialectKind::Postgres, Some(column)) => format!(
            "SELECT * FROM {} ORDER BY {} ASC NULLS FIRST, ctid",
            quote_ident(table),
            quote_ident(column)
        ),
        (DialectKind::Postgres, None) => {
            format!("SELECT * FROM {} ORDER BY ctid", quote_ident(table))
        }
    }
}

pub fn select_where_eq(kind: DialectKind, table: &str, column: &str) -> String {
    let base = format!(
        "SELECT * FROM {} WHERE {} = {}",
        quote_ident(table),
        quote_ident(column),
        placeholder(kind, 1)
    );
    match kind {
        DialectKind::Sqlite => format!("{} ORDER BY rowid", base),
        DialectKind::Postgres => base,
    }
}
