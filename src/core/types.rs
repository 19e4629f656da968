use std::collections::BTreeMap;
use std::fmt;

use crate::core::Value;

/// Normalized storage class of a column.
///
/// Both backends report declared types in their own spelling (`INTEGER` vs `integer`,
/// `VARCHAR(255)` vs `character varying`); comparisons happen on this vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    String,
    Text,
    Date,
    Boolean,
    Float,
    Blob,
    Other(String),
}

impl ColumnType {
    pub fn from_declared(declared: &str) -> Self {
        let normalized = declared.trim().to_ascii_uppercase();
        let base = normalized
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default();

        match base {
            "INTEGER" | "INT" | "INT2" | "INT4" | "INT8" | "BIGINT" | "SMALLINT" | "SERIAL"
            | "BIGSERIAL" => Self::Integer,
            "VARCHAR" | "CHARACTER" | "CHAR" | "STRING" => Self::String,
            "TEXT" | "CLOB" => Self::Text,
            "DATE" | "DATETIME" | "TIMESTAMP" | "TIMESTAMPTZ" => Self::Date,
            "BOOLEAN" | "BOOL" | "TINYINT" => Self::Boolean,
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" | "DECIMAL" => Self::Float,
            "BLOB" | "BYTEA" => Self::Blob,
            _ => Self::Other(normalized),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::String => write!(f, "VARCHAR(255)"),
            Self::Text => write!(f, "TEXT"),
            Self::Date => write!(f, "DATETIME"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Float => write!(f, "FLOAT"),
            Self::Blob => write!(f, "BLOB"),
            Self::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// Desired shape of one column in a table the migration engine creates.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub primary_key: bool,
    pub auto_increment: bool,
}

impl ColumnSpec {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
        }
    }

    /// Auto-incrementing integer surrogate key.
    pub fn surrogate_key(name: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: ColumnType::Integer,
            nullable: false,
            default: None,
            primary_key: true,
            auto_increment: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether a row may omit this column on insert.
    pub fn is_omittable(&self) -> bool {
        self.nullable || self.default.is_some() || self.auto_increment
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Same columns under another table name, used for the staging table.
    pub fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: self.columns.clone(),
        }
    }
}

/// Observed shape of one column, as reported by the live store.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub declared_type: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// Observed shape of a table: column name -> descriptor, in ordinal order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDescriptor {
    pub table: String,
    pub columns: Vec<(String, ColumnDescriptor)>,
}

impl SchemaDescriptor {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
        }
    }

    pub fn push(&mut self, name: &str, descriptor: ColumnDescriptor) {
        self.columns.push((name.to_string(), descriptor));
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One row read from a table, addressed by column name.
pub type Row = BTreeMap<String, Value>;
