pub mod error;
pub mod types;
pub mod value;

pub use error::{ErrorKind, RegistryError, Result, ResultExt};
pub use types::{Column, Relation, RelationKind, Row, TableSchema, audit_columns};
pub use value::{DataType, Value, parse_date, parse_timestamp};
