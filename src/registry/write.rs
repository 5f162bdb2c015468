use super::{Preload, Registry, missing_id};
use crate::core::{RegistryError, Result, ResultExt, Row, audit_columns};
use crate::entity::Entity;
use crate::storage::Visibility;
use crate::transaction::{Change, Transaction};
use chrono::Utc;
use std::collections::HashSet;
use uuid::Uuid;

impl<E: Entity> Registry<E> {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Inserts `entity`, then reloads it in place with `preload`.
    pub async fn create(&self, entity: &mut E, preload: &Preload) -> Result<()> {
        let tx = self.db.begin();
        self.create_tx(&tx, entity, preload).await?;
        tx.commit().await.context("create", self.name())
    }

    pub async fn create_tx(&self, tx: &Transaction, entity: &mut E, preload: &Preload) -> Result<()> {
        self.traced("create", self.name(), self.insert(tx, entity, preload))
            .await
    }

    /// Inserts every entity in one transaction; any failure inserts none.
    pub async fn create_many(&self, entities: &mut [E], preload: &Preload) -> Result<()> {
        let tx = self.db.begin();
        self.create_many_tx(&tx, entities, preload).await?;
        tx.commit().await.context("create_many", self.name())
    }

    pub async fn create_many_tx(
        &self,
        tx: &Transaction,
        entities: &mut [E],
        preload: &Preload,
    ) -> Result<()> {
        let target = format!("{} x{}", self.name(), entities.len());
        self.traced("create_many", target, async {
            for entity in entities.iter_mut() {
                self.insert(tx, entity, preload).await?;
            }
            Ok(())
        })
        .await
    }

    async fn insert(&self, tx: &Transaction, entity: &mut E, preload: &Preload) -> Result<()> {
        tx.ensure_active()?;
        entity.audit_mut().prepare_create(Utc::now());
        let id = entity.id();

        let taken = self
            .base_query()
            .by_id(id)
            .visibility(Visibility::IncludingDeleted);
        if self.engine().count(taken, Some(tx)).await? > 0 {
            return Err(RegistryError::ConstraintViolation(format!(
                "Duplicate identity {} in '{}'",
                id,
                self.name()
            )));
        }

        let row = E::schema().normalize(entity.to_row())?;
        tx.record(Change::Insert {
            table: self.name().to_string(),
            row,
        })?;

        *entity = self
            .load_by_id(id, Visibility::Live, preload, Some(tx))
            .await?;
        self.queue_notification(tx, self.created.as_ref(), entity)?;
        tracing::debug!(%id, "entity created");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrites the stored row with every column of `patch` that differs
    /// from `E::default()`, stamps `updated_at`, and reloads the stored
    /// entity into `*patch`.
    ///
    /// Identity, creation and deletion columns are never written. There is
    /// no version check: the last committed update wins.
    pub async fn update_by_id(&self, id: Uuid, patch: &mut E, preload: &Preload) -> Result<()> {
        let tx = self.db.begin();
        self.update_by_id_tx(&tx, id, patch, preload).await?;
        tx.commit().await.context("update_by_id", id)
    }

    pub async fn update_by_id_tx(
        &self,
        tx: &Transaction,
        id: Uuid,
        patch: &mut E,
        preload: &Preload,
    ) -> Result<()> {
        self.traced("update_by_id", id, async {
            let current = self.lock_live(tx, id).await?;
            let row = merge_patch(current, patch.to_row(), Some(E::default().to_row()));
            self.rewrite(tx, id, row, patch, preload).await
        })
        .await
    }

    /// `update_by_id` keyed by the entity's own id.
    pub async fn update(&self, entity: &mut E, preload: &Preload) -> Result<()> {
        let id = entity.id();
        self.update_by_id(id, entity, preload).await
    }

    pub async fn update_tx(&self, tx: &Transaction, entity: &mut E, preload: &Preload) -> Result<()> {
        let id = entity.id();
        self.update_by_id_tx(tx, id, entity, preload).await
    }

    /// Overwrites every writable column of the stored row with `fields`,
    /// zero values included, then reloads the stored entity into `*fields`.
    ///
    /// This is the way to clear a column; `update_by_id` leaves zero-valued
    /// columns untouched.
    pub async fn update_fields(&self, id: Uuid, fields: &mut E, preload: &Preload) -> Result<()> {
        let tx = self.db.begin();
        self.update_fields_tx(&tx, id, fields, preload).await?;
        tx.commit().await.context("update_fields", id)
    }

    pub async fn update_fields_tx(
        &self,
        tx: &Transaction,
        id: Uuid,
        fields: &mut E,
        preload: &Preload,
    ) -> Result<()> {
        self.traced("update_fields", id, async {
            let current = self.lock_live(tx, id).await?;
            let row = merge_patch(current, fields.to_row(), None);
            self.rewrite(tx, id, row, fields, preload).await
        })
        .await
    }

    /// Updates every entity by its own id in one transaction; any failure updates none.
    pub async fn update_many(&self, entities: &mut [E], preload: &Preload) -> Result<()> {
        let tx = self.db.begin();
        self.update_many_tx(&tx, entities, preload).await?;
        tx.commit().await.context("update_many", self.name())
    }

    pub async fn update_many_tx(
        &self,
        tx: &Transaction,
        entities: &mut [E],
        preload: &Preload,
    ) -> Result<()> {
        let target = format!("{} x{}", self.name(), entities.len());
        self.traced("update_many", target, async {
            for entity in entities.iter_mut() {
                self.update_tx(tx, entity, preload).await?;
            }
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------
    // Upsert
    // ------------------------------------------------------------------

    /// Updates the live row with the entity's id, or creates the entity when
    /// its id is nil or unknown.
    ///
    /// An id that only matches a soft-deleted row fails as a duplicate identity.
    pub async fn upsert(&self, entity: &mut E, preload: &Preload) -> Result<()> {
        let tx = self.db.begin();
        self.upsert_tx(&tx, entity, preload).await?;
        tx.commit().await.context("upsert", self.name())
    }

    pub async fn upsert_tx(&self, tx: &Transaction, entity: &mut E, preload: &Preload) -> Result<()> {
        let id = entity.id();
        if id.is_nil() {
            return self.create_tx(tx, entity, preload).await;
        }
        let live = self.base_query().by_id(id);
        let exists = self.engine().count(live, Some(tx)).await.context("upsert", id)? > 0;
        if exists {
            self.update_by_id_tx(tx, id, entity, preload).await
        } else {
            self.create_tx(tx, entity, preload).await
        }
    }

    /// Upserts every entity in one transaction; any failure writes none.
    pub async fn upsert_many(&self, entities: &mut [E], preload: &Preload) -> Result<()> {
        let tx = self.db.begin();
        self.upsert_many_tx(&tx, entities, preload).await?;
        tx.commit().await.context("upsert_many", self.name())
    }

    pub async fn upsert_many_tx(
        &self,
        tx: &Transaction,
        entities: &mut [E],
        preload: &Preload,
    ) -> Result<()> {
        let target = format!("{} x{}", self.name(), entities.len());
        self.traced("upsert_many", target, async {
            for entity in entities.iter_mut() {
                self.upsert_tx(tx, entity, preload).await?;
            }
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Soft delete: stamps `deleted_at` and `deleted_by_id`, keeping the row.
    pub async fn delete(&self, id: Uuid, actor: Option<Uuid>) -> Result<()> {
        let tx = self.db.begin();
        self.delete_tx(&tx, id, actor).await?;
        tx.commit().await.context("delete", id)
    }

    pub async fn delete_tx(&self, tx: &Transaction, id: Uuid, actor: Option<Uuid>) -> Result<()> {
        self.traced("delete", id, async {
            let current = self.lock_live(tx, id).await?;
            self.soft_delete_row(tx, current, actor)
        })
        .await
    }

    /// Physically removes the row, soft-deleted or not.
    pub async fn hard_delete(&self, id: Uuid) -> Result<()> {
        let tx = self.db.begin();
        self.hard_delete_tx(&tx, id).await?;
        tx.commit().await.context("hard_delete", id)
    }

    pub async fn hard_delete_tx(&self, tx: &Transaction, id: Uuid) -> Result<()> {
        self.traced("hard_delete", id, async {
            let query = self
                .base_query()
                .by_id(id)
                .visibility(Visibility::IncludingDeleted);
            let current = self
                .engine()
                .select_locked(query, tx)
                .await?
                .pop()
                .ok_or_else(|| missing_id::<E>(id))?;
            self.remove_row(tx, current)
        })
        .await
    }

    /// Soft-deletes every id, or none of them when any id is not a live row.
    pub async fn bulk_delete(&self, ids: &[Uuid], actor: Option<Uuid>) -> Result<usize> {
        let tx = self.db.begin();
        let deleted = self.bulk_delete_tx(&tx, ids, actor).await?;
        tx.commit().await.context("bulk_delete", self.name())?;
        Ok(deleted)
    }

    pub async fn bulk_delete_tx(
        &self,
        tx: &Transaction,
        ids: &[Uuid],
        actor: Option<Uuid>,
    ) -> Result<usize> {
        let target = format!("{} x{}", self.name(), ids.len());
        self.traced("bulk_delete", target, async {
            let rows = self.lock_all(tx, ids, Visibility::Live).await?;
            for row in rows {
                self.soft_delete_row(tx, row, actor)?;
            }
            Ok(ids.len())
        })
        .await
    }

    /// Physically removes every id, or none of them when any id does not exist.
    pub async fn bulk_hard_delete(&self, ids: &[Uuid]) -> Result<usize> {
        let tx = self.db.begin();
        let deleted = self.bulk_hard_delete_tx(&tx, ids).await?;
        tx.commit().await.context("bulk_hard_delete", self.name())?;
        Ok(deleted)
    }

    pub async fn bulk_hard_delete_tx(&self, tx: &Transaction, ids: &[Uuid]) -> Result<usize> {
        let target = format!("{} x{}", self.name(), ids.len());
        self.traced("bulk_hard_delete", target, async {
            let rows = self
                .lock_all(tx, ids, Visibility::IncludingDeleted)
                .await?;
            for row in rows {
                self.remove_row(tx, row)?;
            }
            Ok(ids.len())
        })
        .await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Records `row` as the new state of `id`, reloads it into `target` and
    /// queues the updated notification.
    async fn rewrite(
        &self,
        tx: &Transaction,
        id: Uuid,
        row: Row,
        target: &mut E,
        preload: &Preload,
    ) -> Result<()> {
        let row = E::schema().normalize(row)?;
        tx.record(Change::Update {
            table: self.name().to_string(),
            id,
            row,
        })?;

        *target = self
            .load_by_id(id, Visibility::Live, preload, Some(tx))
            .await?;
        self.queue_notification(tx, self.updated.as_ref(), target)
    }

    async fn lock_live(&self, tx: &Transaction, id: Uuid) -> Result<Row> {
        self.engine()
            .select_locked(self.base_query().by_id(id), tx)
            .await?
            .pop()
            .ok_or_else(|| missing_id::<E>(id))
    }

    /// Locks every id; all of them must resolve under `visibility`.
    async fn lock_all(
        &self,
        tx: &Transaction,
        ids: &[Uuid],
        visibility: Visibility,
    ) -> Result<Vec<Row>> {
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();
        if wanted.len() != ids.len() {
            return Err(RegistryError::Validation(format!(
                "duplicate identities in bulk request for '{}'",
                self.name()
            )));
        }
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let lookup = wanted.clone();
        let query = self
            .base_query()
            .where_fn(move |row| row.id().is_some_and(|id| lookup.contains(&id)))
            .visibility(visibility);
        let rows = self.engine().select_locked(query, tx).await?;

        let found: HashSet<Uuid> = rows.iter().filter_map(Row::id).collect();
        let missing: Vec<Uuid> = ids
            .iter()
            .filter(|id| !found.contains(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            tracing::debug!(missing = missing.len(), "bulk request rejected");
            return Err(RegistryError::PartialFailure {
                entity: self.name().to_string(),
                requested: ids.len(),
                missing,
            });
        }
        Ok(rows)
    }

    fn soft_delete_row(&self, tx: &Transaction, mut row: Row, actor: Option<Uuid>) -> Result<()> {
        let id = row.uuid(audit_columns::ID)?;
        row.set(audit_columns::DELETED_AT, Utc::now());
        row.set(audit_columns::DELETED_BY_ID, actor);
        let entity = E::from_row(&row)?;
        tx.record(Change::Update {
            table: self.name().to_string(),
            id,
            row,
        })?;
        self.queue_notification(tx, self.deleted.as_ref(), &entity)
    }

    fn remove_row(&self, tx: &Transaction, row: Row) -> Result<()> {
        let id = row.uuid(audit_columns::ID)?;
        let entity = E::from_row(&row)?;
        tx.record(Change::Delete {
            table: self.name().to_string(),
            id,
        })?;
        self.queue_notification(tx, self.deleted.as_ref(), &entity)
    }
}

/// Applies the writable columns of `patch` onto `current`.
///
/// With a `zero` row, columns equal to their zero value are skipped.
fn merge_patch(mut current: Row, patch: Row, zero: Option<Row>) -> Row {
    let actor = patch.value(audit_columns::UPDATED_BY_ID).as_uuid();
    for (column, value) in patch {
        let protected = audit_columns::IMMUTABLE.contains(&column.as_str())
            || column == audit_columns::UPDATED_AT
            || column == audit_columns::UPDATED_BY_ID;
        let unset = zero
            .as_ref()
            .is_some_and(|zero| zero.get(&column) == Some(&value));
        if protected || unset {
            continue;
        }
        current.set(column, value);
    }
    current.set(audit_columns::UPDATED_AT, Utc::now());
    if let Some(actor) = actor {
        current.set(audit_columns::UPDATED_BY_ID, actor);
    }
    current
}
