//! Everything needed to declare an entity and work with its registry.
//!
//! ```
//! use entity_registry::prelude::*;
//!
//! let db = Database::in_memory();
//! let filter = Filter::from(vec![Condition::eq("name", "Main")]);
//! assert!(matches!(filter, Filter::Conditions(_)));
//! # let _ = db;
//! ```

pub use crate::core::{
    Column, DataType, ErrorKind, RegistryError, Relation, RelationKind, Result, ResultExt, Row,
    TableSchema, Value, audit_columns,
};
pub use crate::entity::{AuditFields, Entity};
pub use crate::facade::Database;
pub use crate::filter::{
    Condition, EncodedFilterParser, Filter, FilterNode, FilterParser, JsonFilterParser, Operand,
    Operator, SortDirection, SortField,
};
pub use crate::notify::{MemoryBroker, TopicScheme};
pub use crate::query::{Page, PageRequest};
pub use crate::registry::{Preload, Registry, RegistryParams};
pub use crate::storage::{RawQuery, StoreQuery, Visibility};
pub use crate::transaction::Transaction;
