pub mod error;
pub mod types;
pub mod value;

pub use error::{BootstrapError, Result};
pub use types::{ColumnDescriptor, ColumnSpec, ColumnType, Row, SchemaDescriptor, TableSpec};
pub use value::Value;
