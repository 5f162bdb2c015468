use super::{Page, PageRequest};
use crate::config::RegistryConfig;
use crate::core::{Result, Row, TableSchema, Value};
use crate::filter::{SortField, resolve_sort};
use crate::storage::{Store, StoreQuery, TxView};
use crate::transaction::Transaction;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Min,
    Max,
}

/// Sorts, pages, counts and aggregates compiled store queries.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn Store>,
    config: Arc<RegistryConfig>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn Store>, config: Arc<RegistryConfig>) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Caller keys, else keys already on the query, else the configured default;
    /// always ending in the `id` tiebreaker.
    pub fn effective_sort(
        &self,
        requested: &[SortField],
        query: &StoreQuery,
        schema: &TableSchema,
    ) -> Result<Vec<SortField>> {
        let keys = if requested.is_empty() {
            query.sort_fields()
        } else {
            requested
        };
        resolve_sort(keys, &self.config.default_sort, schema)
    }

    /// Runs the windowed data read, then the count read.
    pub async fn page(
        &self,
        query: StoreQuery,
        sort: &[SortField],
        page: PageRequest,
        schema: &TableSchema,
        tx: Option<&Transaction>,
    ) -> Result<Page<Row>> {
        page.validate()?;
        let view = view_of(tx)?;
        let page_size = page.page_size.min(self.config.max_page_size);
        let sort = self.effective_sort(sort, &query, schema)?;
        let offset = (page.page_index - 1).saturating_mul(page_size);

        let data_query = query
            .clone()
            .sort(sort.clone())
            .offset(offset)
            .limit(page_size);
        let items = self.store.select(&data_query, view.as_ref()).await?;
        // Separate read: no shared snapshot with the data query.
        let total_size = self.store.count(&query.unbounded(), view.as_ref()).await?;

        tracing::debug!(
            table = schema.name(),
            page_index = page.page_index,
            page_size,
            returned = items.len(),
            total_size,
            "page read"
        );

        Ok(Page {
            items,
            total_size,
            total_pages: Page::<Row>::total_pages_for(total_size, page_size),
            page_index: page.page_index,
            page_size,
            sort,
        })
    }

    /// Whole filtered, sorted set, truncated to `unpaginated_limit` when one is configured.
    pub async fn all(
        &self,
        query: StoreQuery,
        sort: &[SortField],
        schema: &TableSchema,
        tx: Option<&Transaction>,
    ) -> Result<Vec<Row>> {
        let view = view_of(tx)?;
        let sort = self.effective_sort(sort, &query, schema)?;
        let mut query = query.sort(sort);
        if let Some(cap) = self.config.unpaginated_limit {
            query = query.limit(cap.saturating_add(1));
        }

        let mut rows = self.store.select(&query, view.as_ref()).await?;
        self.truncate(&mut rows, schema);
        Ok(rows)
    }

    /// `all`, locking every returned row for `tx`.
    ///
    /// Under a cap the one extra row read to detect truncation stays locked too.
    pub async fn all_locked(
        &self,
        query: StoreQuery,
        sort: &[SortField],
        schema: &TableSchema,
        tx: &Transaction,
    ) -> Result<Vec<Row>> {
        let view = tx.view()?;
        let sort = self.effective_sort(sort, &query, schema)?;
        let mut query = query.sort(sort);
        if let Some(cap) = self.config.unpaginated_limit {
            query = query.limit(cap.saturating_add(1));
        }

        let mut rows = self
            .store
            .select_for_update(&query, &view, self.config.lock_timeout)
            .await?;
        self.truncate(&mut rows, schema);
        Ok(rows)
    }

    pub async fn first(
        &self,
        query: StoreQuery,
        sort: &[SortField],
        schema: &TableSchema,
        tx: Option<&Transaction>,
    ) -> Result<Option<Row>> {
        let view = view_of(tx)?;
        let sort = self.effective_sort(sort, &query, schema)?;
        let query = query.sort(sort).limit(1);
        Ok(self.store.select(&query, view.as_ref()).await?.into_iter().next())
    }

    pub async fn first_locked(
        &self,
        query: StoreQuery,
        sort: &[SortField],
        schema: &TableSchema,
        tx: &Transaction,
    ) -> Result<Option<Row>> {
        let view = tx.view()?;
        let sort = self.effective_sort(sort, &query, schema)?;
        let query = query.sort(sort).limit(1);
        Ok(self
            .store
            .select_for_update(&query, &view, self.config.lock_timeout)
            .await?
            .into_iter()
            .next())
    }

    /// Locks every matching row as is, without default sort or unpaginated cap.
    pub async fn select_locked(&self, query: StoreQuery, tx: &Transaction) -> Result<Vec<Row>> {
        let view = tx.view()?;
        self.store
            .select_for_update(&query, &view, self.config.lock_timeout)
            .await
    }

    pub async fn count(&self, query: StoreQuery, tx: Option<&Transaction>) -> Result<usize> {
        let view = view_of(tx)?;
        self.store.count(&query.unbounded(), view.as_ref()).await
    }

    /// Min or max of `column` over the matching rows; `Null` values are skipped.
    pub async fn aggregate(
        &self,
        query: StoreQuery,
        column: &str,
        aggregate: Aggregate,
        schema: &TableSchema,
        tx: Option<&Transaction>,
    ) -> Result<Option<Value>> {
        let query = extreme_query(query, column, aggregate, schema)?;
        let view = view_of(tx)?;
        let rows = self.store.select(&query, view.as_ref()).await?;
        Ok(rows.first().map(|row| row.value(column).clone()))
    }

    /// `aggregate`, locking the row that carries the extreme value.
    pub async fn aggregate_locked(
        &self,
        query: StoreQuery,
        column: &str,
        aggregate: Aggregate,
        schema: &TableSchema,
        tx: &Transaction,
    ) -> Result<Option<Value>> {
        let query = extreme_query(query, column, aggregate, schema)?;
        let view = tx.view()?;
        let rows = self
            .store
            .select_for_update(&query, &view, self.config.lock_timeout)
            .await?;
        Ok(rows.first().map(|row| row.value(column).clone()))
    }

    fn truncate(&self, rows: &mut Vec<Row>, schema: &TableSchema) {
        if let Some(cap) = self.config.unpaginated_limit
            && rows.len() > cap
        {
            tracing::warn!(
                table = schema.name(),
                limit = cap,
                "unpaginated read truncated to configured limit"
            );
            rows.truncate(cap);
        }
    }
}

fn view_of(tx: Option<&Transaction>) -> Result<Option<TxView>> {
    tx.map(Transaction::view).transpose()
}

fn extreme_query(
    query: StoreQuery,
    column: &str,
    aggregate: Aggregate,
    schema: &TableSchema,
) -> Result<StoreQuery> {
    schema.require_column(column)?;
    let name = column.to_string();
    let key = match aggregate {
        Aggregate::Min => SortField::asc(column),
        Aggregate::Max => SortField::desc(column),
    };
    Ok(query
        .where_fn(move |row| !row.value(&name).is_null())
        .sort(vec![key, SortField::asc("id")])
        .unbounded()
        .limit(1))
}
