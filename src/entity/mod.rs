mod audit;

pub use audit::AuditFields;

use crate::core::{RegistryError, Result, Row, TableSchema};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// A persisted domain record managed by a [`Registry`](crate::registry::Registry).
///
/// `Default` is the zero value: by-example filters ignore every column that
/// still equals it, and update patches only write columns that differ from it.
pub trait Entity: Clone + Default + Send + Sync + 'static {
    /// Public-facing projection published to callers and brokers.
    type Response: Serialize + Clone + Send + Sync + 'static;
    /// Input shape accepted from callers.
    type Request: DeserializeOwned + Send + 'static;

    /// Returns the table layout, including relations.
    fn schema() -> &'static TableSchema;
    /// Returns the audit columns.
    fn audit(&self) -> &AuditFields;
    /// Returns the audit columns for mutation.
    fn audit_mut(&mut self) -> &mut AuditFields;
    /// Serializes the persisted columns. Preloaded relations are not part of the row.
    fn to_row(&self) -> Row;
    /// Rebuilds the entity from a stored row.
    fn from_row(row: &Row) -> Result<Self>;

    /// Hands the rows loaded for a preloaded relation to the entity.
    fn attach(&mut self, relation: &str, rows: Vec<Row>) -> Result<()> {
        let _ = rows;
        Err(RegistryError::Validation(format!(
            "'{}' does not accept relation '{}'",
            Self::schema().name(),
            relation
        )))
    }

    fn id(&self) -> Uuid {
        self.audit().id
    }
}
