use super::{RowLockManager, Store, StoreQuery, Table, TxView};
use crate::core::{RegistryError, Result, Row, TableSchema};
use crate::filter::RowComparator;
use crate::transaction::{Change, TransactionId, change::overlay};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock as SyncRwLock};
use std::time::Duration;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

/// In-process transactional store.
///
/// Each table sits behind its own `RwLock`; the catalog lock is only held
/// while looking a table up or registering a new one.
#[derive(Default)]
pub struct MemoryStore {
    tables: SyncRwLock<HashMap<String, Arc<RwLock<Table>>>>,
    locks: RowLockManager,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle to a table for concurrent access
    pub fn get_table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.tables
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables
            .read()
            .map(|tables| tables.contains_key(name))
            .unwrap_or(false)
    }

    /// Committed row count, soft-deleted rows included
    pub async fn row_count(&self, table: &str) -> Result<usize> {
        let handle = self.get_table(table)?;
        let table = handle.read().await;
        Ok(table.row_count())
    }

    /// Committed rows merged with the pending writes of `tx`, filtered by `query`.
    async fn scan(&self, query: &StoreQuery, tx: Option<&TxView>) -> Result<Vec<Row>> {
        let handle = self.get_table(query.table())?;
        let pending: Vec<&Change> = tx
            .map(|tx| {
                tx.changes
                    .iter()
                    .filter(|c| c.table_name() == query.table())
                    .collect()
            })
            .unwrap_or_default();

        let table = handle.read().await;
        if pending.is_empty() {
            return Ok(table.scan().filter(|row| query.matches(row)).cloned().collect());
        }

        let mut rows: Vec<Row> = table.scan().cloned().collect();
        drop(table);
        overlay(&mut rows, pending);
        rows.retain(|row| query.matches(row));
        Ok(rows)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        let mut tables = self.tables.write()?;
        if !tables.contains_key(schema.name()) {
            tracing::debug!(table = schema.name(), "creating table");
            tables.insert(
                schema.name().to_string(),
                Arc::new(RwLock::new(Table::new(schema.clone()))),
            );
        }
        Ok(())
    }

    async fn select(&self, query: &StoreQuery, tx: Option<&TxView>) -> Result<Vec<Row>> {
        let mut rows = self.scan(query, tx).await?;
        if !query.sort_fields().is_empty() {
            RowComparator::new(query.sort_fields()).sort(&mut rows);
        }

        let (offset, limit) = query.window();
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self, query: &StoreQuery, tx: Option<&TxView>) -> Result<usize> {
        Ok(self.scan(query, tx).await?.len())
    }

    async fn select_for_update(
        &self,
        query: &StoreQuery,
        tx: &TxView,
        timeout: Duration,
    ) -> Result<Vec<Row>> {
        let deadline = Instant::now() + timeout;
        loop {
            let rows = self.select(query, Some(tx)).await?;
            let ids: Vec<Uuid> = rows.iter().filter_map(Row::id).collect();
            if ids
                .iter()
                .all(|id| self.locks.holds(query.table(), *id, tx.id))
            {
                return Ok(rows);
            }
            // Rows may change while we wait, so read again once the locks are ours.
            self.locks
                .acquire_all(query.table(), &ids, tx.id, deadline)
                .await?;
        }
    }

    async fn lock_rows(
        &self,
        table: &str,
        ids: &[Uuid],
        tx: TransactionId,
        timeout: Duration,
    ) -> Result<()> {
        self.locks
            .acquire_all(table, ids, tx, Instant::now() + timeout)
            .await
    }

    async fn apply(&self, changes: Vec<Change>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        // Lock tables in name order so concurrent commits cannot deadlock.
        let names: BTreeSet<String> = changes
            .iter()
            .map(|c| c.table_name().to_string())
            .collect();
        let mut guards: BTreeMap<String, OwnedRwLockWriteGuard<Table>> = BTreeMap::new();
        for name in names {
            let handle = self.get_table(&name)?;
            guards.insert(name, handle.write_owned().await);
        }

        // Validate the whole log against staged state before touching any table.
        let mut staged: HashMap<(String, Uuid), Option<Row>> = HashMap::new();
        for change in changes {
            let name = change.table_name().to_string();
            let table = guards
                .get(&name)
                .ok_or_else(|| RegistryError::TableNotFound(name.clone()))?;

            let inserting = matches!(change, Change::Insert { .. });
            let (id, row) = match change {
                Change::Insert { row, .. } => {
                    let (id, row) = table.prepare(row)?;
                    (id, Some(row))
                }
                Change::Update { id, row, .. } => {
                    let (row_id, row) = table.prepare(row)?;
                    if row_id != id {
                        return Err(RegistryError::Validation(format!(
                            "Update of {} in '{}' may not change its identity",
                            id, name
                        )));
                    }
                    (id, Some(row))
                }
                Change::Delete { id, .. } => (id, None),
            };

            let key = (name, id);
            let exists = match staged.get(&key) {
                Some(current) => current.is_some(),
                None => table.contains(&id),
            };
            if inserting && exists {
                return Err(RegistryError::ConstraintViolation(format!(
                    "Duplicate identity {} in '{}'",
                    id, key.0
                )));
            }
            if !inserting && !exists {
                return Err(RegistryError::not_found(
                    key.0,
                    format!("no row with id {}", id),
                ));
            }
            staged.insert(key, row);
        }

        for ((name, id), row) in staged {
            if let Some(table) = guards.get_mut(&name) {
                match row {
                    Some(row) => table.put(id, row),
                    None => {
                        table.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    fn release_locks(&self, tx: TransactionId) {
        self.locks.release(tx);
    }
}
