use super::{Preload, Registry, as_i64, missing_id};
use crate::core::{RegistryError, Result, Row, Value};
use crate::entity::Entity;
use crate::filter::Filter;
use crate::query::Aggregate;
use crate::storage::Visibility;
use crate::transaction::Transaction;
use uuid::Uuid;

impl<E: Entity> Registry<E> {
    // ------------------------------------------------------------------
    // By identity
    // ------------------------------------------------------------------

    /// Live entity by id; soft-deleted rows are `NotFound`.
    pub async fn get_by_id(&self, id: Uuid, preload: &Preload) -> Result<E> {
        self.traced("get_by_id", id, self.load_by_id(id, Visibility::Live, preload, None))
            .await
    }

    /// Entity by id whether or not it is soft-deleted.
    pub async fn get_by_id_including_deleted(&self, id: Uuid, preload: &Preload) -> Result<E> {
        self.traced(
            "get_by_id_including_deleted",
            id,
            self.load_by_id(id, Visibility::IncludingDeleted, preload, None),
        )
        .await
    }

    /// Live entity by id as seen from inside `tx`.
    pub async fn get_by_id_tx(&self, tx: &Transaction, id: Uuid, preload: &Preload) -> Result<E> {
        self.traced(
            "get_by_id_tx",
            id,
            self.load_by_id(id, Visibility::Live, preload, Some(tx)),
        )
        .await
    }

    /// Live entity by id, row-locked for `tx` until it commits or rolls back.
    pub async fn get_by_id_lock(&self, tx: &Transaction, id: Uuid, preload: &Preload) -> Result<E> {
        self.traced("get_by_id_lock", id, async {
            let row = self
                .engine()
                .first_locked(self.base_query().by_id(id), &[], E::schema(), tx)
                .await?
                .ok_or_else(|| missing_id::<E>(id))?;
            self.one(row, preload, Some(tx)).await
        })
        .await
    }

    pub async fn get_by_id_response(&self, id: Uuid) -> Result<E::Response> {
        let entity = self.get_by_id(id, &Preload::Default).await?;
        Ok((self.resource)(&entity))
    }

    pub(super) async fn load_by_id(
        &self,
        id: Uuid,
        visibility: Visibility,
        preload: &Preload,
        tx: Option<&Transaction>,
    ) -> Result<E> {
        let query = self.base_query().by_id(id).visibility(visibility);
        let row = self
            .engine()
            .first(query, &[], E::schema(), tx)
            .await?
            .ok_or_else(|| missing_id::<E>(id))?;
        self.one(row, preload, tx).await
    }

    pub(super) async fn one(
        &self,
        row: Row,
        preload: &Preload,
        tx: Option<&Transaction>,
    ) -> Result<E> {
        let mut entities = self.hydrate(vec![row], preload, tx).await?;
        entities
            .pop()
            .ok_or_else(|| RegistryError::not_found(self.name(), "empty hydration"))
    }

    // ------------------------------------------------------------------
    // By filter
    // ------------------------------------------------------------------

    /// Every live entity in default order.
    pub async fn list(&self, preload: &Preload) -> Result<Vec<E>> {
        self.find_all(&Filter::all(), &[], preload).await
    }

    pub async fn list_response(&self) -> Result<Vec<E::Response>> {
        let entities = self.list(&Preload::Default).await?;
        Ok(self.to_models(&entities))
    }

    /// Every live entity matching `filter`, in default order.
    pub async fn find(&self, filter: &Filter, preload: &Preload) -> Result<Vec<E>> {
        self.traced("find", filter, async {
            let query = self.filtered(filter, Visibility::Live)?;
            let rows = self.engine().all(query, &[], E::schema(), None).await?;
            self.hydrate(rows, preload, None).await
        })
        .await
    }

    /// First live match in default order; `NotFound` when nothing matches.
    pub async fn find_one(&self, filter: &Filter, preload: &Preload) -> Result<E> {
        self.traced(
            "find_one",
            filter,
            self.first_match(filter, Visibility::Live, preload, None),
        )
        .await
    }

    pub async fn find_including_deleted(&self, filter: &Filter, preload: &Preload) -> Result<Vec<E>> {
        self.traced("find_including_deleted", filter, async {
            let query = self.filtered(filter, Visibility::IncludingDeleted)?;
            let rows = self.engine().all(query, &[], E::schema(), None).await?;
            self.hydrate(rows, preload, None).await
        })
        .await
    }

    pub async fn find_one_including_deleted(&self, filter: &Filter, preload: &Preload) -> Result<E> {
        self.traced(
            "find_one_including_deleted",
            filter,
            self.first_match(filter, Visibility::IncludingDeleted, preload, None),
        )
        .await
    }

    /// `find` as seen from inside `tx`, its own pending writes included.
    pub async fn find_tx(&self, tx: &Transaction, filter: &Filter, preload: &Preload) -> Result<Vec<E>> {
        self.traced("find_tx", filter, async {
            let query = self.filtered(filter, Visibility::Live)?;
            let rows = self.engine().all(query, &[], E::schema(), Some(tx)).await?;
            self.hydrate(rows, preload, Some(tx)).await
        })
        .await
    }

    /// `find`, locking every returned row for `tx`.
    pub async fn find_lock(&self, tx: &Transaction, filter: &Filter, preload: &Preload) -> Result<Vec<E>> {
        self.traced("find_lock", filter, async {
            let query = self.filtered(filter, Visibility::Live)?;
            let rows = self.engine().all_locked(query, &[], E::schema(), tx).await?;
            self.hydrate(rows, preload, Some(tx)).await
        })
        .await
    }

    /// `find_one`, locking the returned row for `tx`.
    pub async fn find_one_lock(&self, tx: &Transaction, filter: &Filter, preload: &Preload) -> Result<E> {
        self.traced("find_one_lock", filter, async {
            let query = self.filtered(filter, Visibility::Live)?;
            let row = self
                .engine()
                .first_locked(query, &[], E::schema(), tx)
                .await?
                .ok_or_else(|| {
                    RegistryError::not_found(self.name(), format!("no match for {}", filter))
                })?;
            self.one(row, preload, Some(tx)).await
        })
        .await
    }

    pub async fn find_response(&self, filter: &Filter) -> Result<Vec<E::Response>> {
        let entities = self.find(filter, &Preload::Default).await?;
        Ok(self.to_models(&entities))
    }

    pub async fn find_one_response(&self, filter: &Filter) -> Result<E::Response> {
        let entity = self.find_one(filter, &Preload::Default).await?;
        Ok((self.resource)(&entity))
    }

    async fn first_match(
        &self,
        filter: &Filter,
        visibility: Visibility,
        preload: &Preload,
        tx: Option<&Transaction>,
    ) -> Result<E> {
        let query = self.filtered(filter, visibility)?;
        let row = self
            .engine()
            .first(query, &[], E::schema(), tx)
            .await?
            .ok_or_else(|| {
                RegistryError::not_found(self.name(), format!("no match for {}", filter))
            })?;
        self.one(row, preload, tx).await
    }

    // ------------------------------------------------------------------
    // Existence and counts
    // ------------------------------------------------------------------

    pub async fn count(&self, filter: &Filter) -> Result<usize> {
        self.traced("count", filter, async {
            let query = self.filtered(filter, Visibility::Live)?;
            self.engine().count(query, None).await
        })
        .await
    }

    pub async fn count_including_deleted(&self, filter: &Filter) -> Result<usize> {
        self.traced("count_including_deleted", filter, async {
            let query = self.filtered(filter, Visibility::IncludingDeleted)?;
            self.engine().count(query, None).await
        })
        .await
    }

    pub async fn count_tx(&self, tx: &Transaction, filter: &Filter) -> Result<usize> {
        self.traced("count_tx", filter, async {
            let query = self.filtered(filter, Visibility::Live)?;
            self.engine().count(query, Some(tx)).await
        })
        .await
    }

    pub async fn exists(&self, filter: &Filter) -> Result<bool> {
        Ok(self.count(filter).await? > 0)
    }

    pub async fn exists_including_deleted(&self, filter: &Filter) -> Result<bool> {
        Ok(self.count_including_deleted(filter).await? > 0)
    }

    /// Whether a live row with this id exists.
    pub async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        self.traced("exists_by_id", id, async {
            let query = self.base_query().by_id(id);
            Ok(self.engine().count(query, None).await? > 0)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Smallest non-null `column` among live matches.
    pub async fn min(&self, filter: &Filter, column: &str) -> Result<Option<Value>> {
        self.aggregate("min", filter, column, Aggregate::Min, None).await
    }

    /// Largest non-null `column` among live matches.
    pub async fn max(&self, filter: &Filter, column: &str) -> Result<Option<Value>> {
        self.aggregate("max", filter, column, Aggregate::Max, None).await
    }

    /// `min`, locking the row that holds it for `tx`.
    pub async fn min_lock(&self, tx: &Transaction, filter: &Filter, column: &str) -> Result<Option<Value>> {
        self.aggregate("min_lock", filter, column, Aggregate::Min, Some(tx))
            .await
    }

    /// `max`, locking the row that holds it for `tx`.
    ///
    /// Two transactions doing "max, then insert max + 1" serialize on the
    /// locked row: the second one waits, then reads the first one's insert.
    pub async fn max_lock(&self, tx: &Transaction, filter: &Filter, column: &str) -> Result<Option<Value>> {
        self.aggregate("max_lock", filter, column, Aggregate::Max, Some(tx))
            .await
    }

    /// Integer `max`, 0 when no row has a value.
    pub async fn max_i64(&self, filter: &Filter, column: &str) -> Result<i64> {
        as_i64(self.max(filter, column).await?)
    }

    async fn aggregate(
        &self,
        operation: &'static str,
        filter: &Filter,
        column: &str,
        aggregate: Aggregate,
        locked: Option<&Transaction>,
    ) -> Result<Option<Value>> {
        let target = format!("{} of {}", column, filter);
        self.traced(operation, target, async {
            let query = self.filtered(filter, Visibility::Live)?;
            match locked {
                Some(tx) => {
                    self.engine()
                        .aggregate_locked(query, column, aggregate, E::schema(), tx)
                        .await
                }
                None => {
                    self.engine()
                        .aggregate(query, column, aggregate, E::schema(), None)
                        .await
                }
            }
        })
        .await
    }
}
