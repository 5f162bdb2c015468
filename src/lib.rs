// ============================================================================
// Entity Registry Library
// ============================================================================
//
// Generic persistence registry over a transactional, row-locking store:
// typed CRUD, three interchangeable filter forms, paginated and locked reads,
// soft delete, and change notification published after commit.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod entity;
pub mod facade;
pub mod filter;
pub mod notify;
pub mod prelude;
pub mod query;
pub mod registry;
pub mod storage;
pub mod transaction;

pub use crate::config::RegistryConfig;
pub use crate::core::{DataType, ErrorKind, RegistryError, Result, Row, TableSchema, Value};
pub use crate::entity::{AuditFields, Entity};
pub use crate::facade::{Database, DatabaseBuilder};
pub use crate::filter::{Condition, Filter, FilterNode, Operand, Operator, SortDirection, SortField};
pub use crate::notify::{Broker, BrokerError, MemoryBroker, TopicFn, TopicScheme, Topics};
pub use crate::query::{Page, PageRequest};
pub use crate::registry::{Preload, Registry, RegistryParams, ResourceFn};
pub use crate::storage::{MemoryStore, RawQuery, Store, StoreQuery, Visibility};
pub use crate::transaction::Transaction;
