//! Exclusive row locks owned by transactions.
//!
//! A lock is held from acquisition until its transaction commits or rolls
//! back. Waiters park on a shared [`Notify`] and retry whenever any
//! transaction releases its locks.

use crate::core::{RegistryError, Result};
use crate::transaction::TransactionId;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

type LockKey = (String, Uuid);

#[derive(Default)]
pub struct RowLockManager {
    owners: Mutex<HashMap<LockKey, TransactionId>>,
    released: Notify,
}

impl RowLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every lock or none. Returns the blocking transaction on conflict.
    pub fn try_acquire_all(
        &self,
        table: &str,
        ids: &[Uuid],
        tx: TransactionId,
    ) -> Result<std::result::Result<(), TransactionId>> {
        let mut owners = self.owners.lock()?;
        for id in ids {
            if let Some(owner) = owners.get(&(table.to_string(), *id))
                && *owner != tx
            {
                return Ok(Err(*owner));
            }
        }
        for id in ids {
            owners.insert((table.to_string(), *id), tx);
        }
        Ok(Ok(()))
    }

    /// Waits until every lock is taken or `deadline` passes.
    pub async fn acquire_all(
        &self,
        table: &str,
        ids: &[Uuid],
        tx: TransactionId,
        deadline: Instant,
    ) -> Result<()> {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register interest before trying so a release in between is not lost.
            notified.as_mut().enable();

            let blocker = match self.try_acquire_all(table, ids, tx)? {
                Ok(()) => return Ok(()),
                Err(blocker) => blocker,
            };

            tracing::debug!(%tx, %blocker, table, "waiting for row lock");
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(RegistryError::Transaction(format!(
                    "{} timed out waiting for a row lock on '{}' held by {}",
                    tx, table, blocker
                )));
            }
        }
    }

    pub fn holds(&self, table: &str, id: Uuid, tx: TransactionId) -> bool {
        self.owners
            .lock()
            .map(|owners| owners.get(&(table.to_string(), id)) == Some(&tx))
            .unwrap_or(false)
    }

    /// Drops every lock owned by `tx` and wakes all waiters.
    pub fn release(&self, tx: TransactionId) {
        let released = {
            let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
            let before = owners.len();
            owners.retain(|_, owner| *owner != tx);
            before - owners.len()
        };
        if released > 0 {
            tracing::trace!(%tx, released, "released row locks");
        }
        self.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_acquire_is_all_or_nothing() {
        let locks = RowLockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(locks.try_acquire_all("t", &[a], t1).unwrap(), Ok(()));
        assert_eq!(locks.try_acquire_all("t", &[b, a], t2).unwrap(), Err(t1));
        assert!(!locks.holds("t", b, t2));
        // Re-entrant for the owner.
        assert_eq!(locks.try_acquire_all("t", &[a, b], t1).unwrap(), Ok(()));

        locks.release(t1);
        assert!(!locks.holds("t", a, t1));
        assert_eq!(locks.try_acquire_all("t", &[a, b], t2).unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let locks = Arc::new(RowLockManager::new());
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        let id = Uuid::new_v4();
        locks.try_acquire_all("t", &[id], t1).unwrap().unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let deadline = Instant::now() + Duration::from_secs(5);
                locks.acquire_all("t", &[id], t2, deadline).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        locks.release(t1);
        waiter.await.unwrap().unwrap();
        assert!(locks.holds("t", id, t2));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let locks = RowLockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        let id = Uuid::new_v4();
        locks.try_acquire_all("t", &[id], t1).unwrap().unwrap();

        let deadline = Instant::now() + Duration::from_millis(30);
        let err = locks.acquire_all("t", &[id], t2, deadline).await.unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::Transaction);
    }
}
