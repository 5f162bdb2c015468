// ============================================================================
// Transaction State Management
// ============================================================================
//
// State Pattern for the transaction lifecycle: Active -> Committed/Aborted.
//
// Isolation is read-committed with read-your-own-writes:
// - reads see committed rows plus this transaction's pending writes
// - writes are buffered as Changes and applied atomically at commit
// - row locks taken by locked reads and writes live until commit/rollback
//
// ============================================================================

use super::Change;
use crate::core::{RegistryError, Result};
use crate::storage::{Store, TxView};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use uuid::Uuid;

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state following the State Pattern
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can execute operations
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been aborted/rolled back
    Aborted,
}

impl TransactionState {
    /// Check if transaction can execute operations
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Callback run once the transaction has committed.
pub type CommitHook = Box<dyn FnOnce() + Send>;

/// Latest notification payload recorded for one row, shared by every hook
/// queued for that row.
pub type PayloadSlot = Arc<Mutex<serde_json::Value>>;

struct TxInner {
    state: TransactionState,
    changes: Vec<Change>,
    on_commit: Vec<CommitHook>,
    payloads: HashMap<(String, Uuid), PayloadSlot>,
}

impl TxInner {
    fn discard(&mut self) {
        self.changes.clear();
        self.on_commit.clear();
        self.payloads.clear();
    }
}

/// An open unit of work against a [`Store`].
///
/// Dropping an active transaction rolls it back: pending writes and queued
/// commit hooks are discarded and its row locks are released.
pub struct Transaction {
    id: TransactionId,
    store: Arc<dyn Store>,
    inner: Mutex<TxInner>,
    start_time: Instant,
}

impl Transaction {
    pub fn begin(store: Arc<dyn Store>) -> Self {
        let id = TransactionId::new();
        tracing::trace!(%id, "transaction started");
        Self {
            id,
            store,
            inner: Mutex::new(TxInner {
                state: TransactionState::Active,
                changes: Vec::new(),
                on_commit: Vec::new(),
                payloads: HashMap::new(),
            }),
            start_time: Instant::now(),
        }
    }

    /// Get the transaction ID
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Get the current state
    pub fn state(&self) -> TransactionState {
        self.inner
            .lock()
            .map(|inner| inner.state)
            .unwrap_or(TransactionState::Aborted)
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Get the number of buffered changes
    pub fn change_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.changes.len()).unwrap_or(0)
    }

    /// Get transaction duration
    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Fails with `Misuse` unless the transaction is still active.
    pub fn ensure_active(&self) -> Result<()> {
        let state = self.inner.lock()?.state;
        if !state.is_active() {
            return Err(RegistryError::Misuse(format!(
                "transaction {} is already {}",
                self.id, state
            )));
        }
        Ok(())
    }

    /// Record a change in this transaction
    pub fn record(&self, change: Change) -> Result<()> {
        let mut inner = self.inner.lock()?;
        if !inner.state.is_active() {
            return Err(RegistryError::Misuse(format!(
                "Cannot record change: transaction {} is {}",
                self.id, inner.state
            )));
        }
        inner.changes.push(change);
        Ok(())
    }

    /// Queues `hook` to run after a successful commit.
    pub fn on_commit(&self, hook: impl FnOnce() + Send + 'static) -> Result<()> {
        let mut inner = self.inner.lock()?;
        if !inner.state.is_active() {
            return Err(RegistryError::Misuse(format!(
                "Cannot queue commit hook: transaction {} is {}",
                self.id, inner.state
            )));
        }
        inner.on_commit.push(Box::new(hook));
        Ok(())
    }

    /// Stores `payload` as the latest state of row `id` in `table` and returns
    /// the slot every notification for that row reads when the hooks run.
    pub fn latest_payload(
        &self,
        table: &str,
        id: Uuid,
        payload: serde_json::Value,
    ) -> Result<PayloadSlot> {
        let mut inner = self.inner.lock()?;
        if !inner.state.is_active() {
            return Err(RegistryError::Misuse(format!(
                "Cannot queue notification: transaction {} is {}",
                self.id, inner.state
            )));
        }
        let slot = inner
            .payloads
            .entry((table.to_string(), id))
            .or_insert_with(|| Arc::new(Mutex::new(serde_json::Value::Null)))
            .clone();
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = payload;
        Ok(slot)
    }

    /// Identity and pending writes, as handed to store reads.
    pub fn view(&self) -> Result<TxView> {
        let inner = self.inner.lock()?;
        if !inner.state.is_active() {
            return Err(RegistryError::Misuse(format!(
                "transaction {} is already {}",
                self.id, inner.state
            )));
        }
        Ok(TxView {
            id: self.id,
            changes: inner.changes.clone(),
        })
    }

    /// Applies every buffered change atomically, releases row locks and then
    /// runs the commit hooks. On failure nothing is applied and the
    /// transaction ends up aborted.
    pub async fn commit(&self) -> Result<()> {
        let (changes, hooks) = {
            let mut inner = self.inner.lock()?;
            if !inner.state.is_active() {
                return Err(RegistryError::Misuse(format!(
                    "Cannot commit: transaction {} is already {}",
                    self.id, inner.state
                )));
            }
            inner.payloads.clear();
            (
                std::mem::take(&mut inner.changes),
                std::mem::take(&mut inner.on_commit),
            )
        };

        let change_count = changes.len();
        let applied = self.store.apply(changes).await;
        self.store.release_locks(self.id);

        match applied {
            Ok(()) => {
                self.set_state(TransactionState::Committed);
                tracing::debug!(
                    id = %self.id,
                    changes = change_count,
                    elapsed_us = self.duration().as_micros() as u64,
                    "transaction committed"
                );
                for hook in hooks {
                    hook();
                }
                Ok(())
            }
            Err(err) => {
                self.set_state(TransactionState::Aborted);
                tracing::debug!(id = %self.id, error = %err, "transaction commit failed");
                Err(RegistryError::Transaction(format!(
                    "commit of {} failed: {}",
                    self.id, err
                )))
            }
        }
    }

    /// Discards buffered changes and queued hooks.
    pub async fn rollback(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock()?;
            if !inner.state.is_active() {
                return Err(RegistryError::Misuse(format!(
                    "Cannot rollback: transaction {} is already {}",
                    self.id, inner.state
                )));
            }
            inner.discard();
            inner.state = TransactionState::Aborted;
        }
        self.store.release_locks(self.id);
        tracing::debug!(id = %self.id, "transaction rolled back");
        Ok(())
    }

    fn set_state(&self, state: TransactionState) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state = state;
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.state.is_active() {
            inner.state = TransactionState::Aborted;
            inner.discard();
            self.store.release_locks(self.id);
            tracing::debug!(id = %self.id, "transaction rolled back on drop");
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("changes", &self.change_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType, Row, TableSchema};
    use crate::storage::{MemoryStore, StoreQuery};
    use chrono::Utc;
    use std::sync::atomic::AtomicBool;
    use uuid::Uuid;

    fn schema() -> TableSchema {
        TableSchema::new("notes").column(Column::new("body", DataType::Text))
    }

    fn note(body: &str) -> Row {
        let now = Utc::now();
        Row::new()
            .with("id", Uuid::new_v4())
            .with("created_at", now)
            .with("updated_at", now)
            .with("body", body)
    }

    async fn store() -> Arc<dyn Store> {
        let store = MemoryStore::new();
        store.ensure_table(&schema()).await.unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2.as_u64() > id1.as_u64());
        assert!(id1.to_string().starts_with("txn_"));
    }

    #[test]
    fn test_lifecycle_without_runtime() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let txn = Transaction::begin(store);
        assert!(txn.state().is_active());
        tokio_test::block_on(txn.commit()).unwrap();
        assert!(txn.state().is_terminal());
        let err = tokio_test::block_on(txn.commit()).unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::Misuse);
    }

    #[tokio::test]
    async fn test_commit_applies_and_runs_hooks() {
        let store = store().await;
        let txn = Transaction::begin(Arc::clone(&store));
        let fired = Arc::new(AtomicBool::new(false));

        txn.record(Change::Insert {
            table: "notes".into(),
            row: note("hello"),
        })
        .unwrap();
        let flag = Arc::clone(&fired);
        txn.on_commit(move || flag.store(true, Ordering::SeqCst)).unwrap();

        // Own writes are visible before commit, others' are not.
        let query = StoreQuery::new("notes");
        assert_eq!(store.count(&query, Some(&txn.view().unwrap())).await.unwrap(), 1);
        assert_eq!(store.count(&query, None).await.unwrap(), 0);

        txn.commit().await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(store.count(&query, None).await.unwrap(), 1);
        assert!(txn.record(Change::Delete { table: "notes".into(), id: Uuid::nil() }).is_err());
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_everything() {
        let store = store().await;
        let fired = Arc::new(AtomicBool::new(false));

        let txn = Transaction::begin(Arc::clone(&store));
        txn.record(Change::Insert { table: "notes".into(), row: note("a") }).unwrap();
        let flag = Arc::clone(&fired);
        txn.on_commit(move || flag.store(true, Ordering::SeqCst)).unwrap();
        txn.rollback().await.unwrap();
        assert_eq!(txn.state(), TransactionState::Aborted);

        {
            let dropped = Transaction::begin(Arc::clone(&store));
            dropped.record(Change::Insert { table: "notes".into(), row: note("b") }).unwrap();
        }

        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(store.count(&StoreQuery::new("notes"), None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hooks_read_the_latest_payload_of_a_row() {
        let store = store().await;
        let txn = Transaction::begin(Arc::clone(&store));
        let id = Uuid::new_v4();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = txn.latest_payload("notes", id, serde_json::json!({"body": "draft"})).unwrap();
        let sink = Arc::clone(&seen);
        txn.on_commit(move || {
            let payload = first.lock().unwrap().clone();
            sink.lock().unwrap().push(payload);
        })
        .unwrap();

        let second = txn.latest_payload("notes", id, serde_json::json!({"body": "final"})).unwrap();
        let other = txn.latest_payload("notes", Uuid::new_v4(), serde_json::json!({"body": "x"})).unwrap();
        assert!(!Arc::ptr_eq(&second, &other));

        txn.commit().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![serde_json::json!({"body": "final"})]);

        let err = txn.latest_payload("notes", id, serde_json::Value::Null).unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::Misuse);
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let store = store().await;
        let txn = Transaction::begin(Arc::clone(&store));
        let row = note("dup");
        txn.record(Change::Insert { table: "notes".into(), row: row.clone() }).unwrap();
        txn.record(Change::Insert { table: "notes".into(), row }).unwrap();

        let err = txn.commit().await.unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::Transaction);
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert_eq!(store.count(&StoreQuery::new("notes"), None).await.unwrap(), 0);
    }
}
