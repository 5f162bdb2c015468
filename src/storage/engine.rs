use super::StoreQuery;
use crate::core::{Result, Row, TableSchema};
use crate::transaction::{Change, TransactionId};
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// What a transaction contributes to a read: its identity and pending writes.
#[derive(Debug, Clone)]
pub struct TxView {
    pub id: TransactionId,
    pub changes: Vec<Change>,
}

/// Storage backend the registry runs against.
///
/// Reads see committed rows, plus the pending writes of `tx` when one is
/// given. Writes arrive only through [`Store::apply`] at commit time.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create the table if it does not exist yet
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()>;

    /// Matching rows, sorted and windowed as the query says
    async fn select(&self, query: &StoreQuery, tx: Option<&TxView>) -> Result<Vec<Row>>;

    /// Number of matching rows; offset and limit are ignored
    async fn count(&self, query: &StoreQuery, tx: Option<&TxView>) -> Result<usize>;

    /// Like `select`, but locks every returned row for `tx`.
    ///
    /// Waits up to `timeout` for rows locked by other transactions and reads
    /// again once they are released. Rows locked on an earlier pass that no
    /// longer match after the re-read stay locked until the transaction ends.
    async fn select_for_update(
        &self,
        query: &StoreQuery,
        tx: &TxView,
        timeout: Duration,
    ) -> Result<Vec<Row>>;

    /// Locks rows by identity for `tx`
    async fn lock_rows(
        &self,
        table: &str,
        ids: &[Uuid],
        tx: TransactionId,
        timeout: Duration,
    ) -> Result<()>;

    /// Validates and applies a change log atomically
    async fn apply(&self, changes: Vec<Change>) -> Result<()>;

    /// Releases every row lock held by `tx`
    fn release_locks(&self, tx: TransactionId);
}
