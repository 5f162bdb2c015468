use super::{Preload, Registry};
use crate::core::{RegistryError, Result};
use crate::entity::Entity;
use crate::filter::{Filter, SortField, parse_query_string};
use crate::query::{Page, PageRequest};
use crate::storage::{RawQuery, StoreQuery, Visibility};

impl<E: Entity> Registry<E> {
    /// One page of live matches.
    pub async fn paginate(
        &self,
        filter: &Filter,
        sort: &[SortField],
        page: PageRequest,
        preload: &Preload,
    ) -> Result<Page<E>> {
        self.traced("paginate", filter, async {
            let query = self.filtered(filter, Visibility::Live)?;
            self.page_of(query, sort, page, preload).await
        })
        .await
    }

    pub async fn paginate_response(
        &self,
        filter: &Filter,
        sort: &[SortField],
        page: PageRequest,
    ) -> Result<Page<E::Response>> {
        let page = self.paginate(filter, sort, page, &Preload::Default).await?;
        Ok(page.map(|entity| (self.resource)(&entity)))
    }

    /// One page of whatever `raw` makes of the base query.
    ///
    /// `raw` receives the live-rows query carrying the default sort. A
    /// non-empty `sort` still wins over any sort `raw` sets.
    pub async fn paginate_with(
        &self,
        raw: RawQuery,
        sort: &[SortField],
        page: PageRequest,
        preload: &Preload,
    ) -> Result<Page<E>> {
        self.traced("paginate_with", "raw query", async {
            let query = raw(self.raw_base());
            self.page_of(query, sort, page, preload).await
        })
        .await
    }

    /// Every live match, sorted, without pagination.
    pub async fn find_all(
        &self,
        filter: &Filter,
        sort: &[SortField],
        preload: &Preload,
    ) -> Result<Vec<E>> {
        self.traced("find_all", filter, async {
            let query = self.filtered(filter, Visibility::Live)?;
            let rows = self.engine().all(query, sort, E::schema(), None).await?;
            self.hydrate(rows, preload, None).await
        })
        .await
    }

    pub async fn find_all_with(
        &self,
        raw: RawQuery,
        sort: &[SortField],
        preload: &Preload,
    ) -> Result<Vec<E>> {
        self.traced("find_all_with", "raw query", async {
            let query = raw(self.raw_base());
            let rows = self.engine().all(query, sort, E::schema(), None).await?;
            self.hydrate(rows, preload, None).await
        })
        .await
    }

    /// Pages through the pipe-separated `filter|sort|pageIndex|pageSize` form.
    ///
    /// `pageIndex` is 0-based on the wire; a missing size takes the configured
    /// default. Relations listed under the filter's `preload` key replace the
    /// default preloads.
    pub async fn paginate_text(&self, text: &str) -> Result<Page<E>> {
        let parsed = parse_query_string(text)?;
        let wire_index = parsed.page_index.unwrap_or(0);
        let page_index = wire_index.checked_add(1).ok_or_else(|| {
            RegistryError::Validation(format!("pageIndex {} is out of range", wire_index))
        })?;
        let page = PageRequest::new(
            page_index,
            parsed
                .page_size
                .unwrap_or(self.db.config().default_page_size),
        );
        let preload = match parsed.preloads {
            Some(names) => Preload::Only(names),
            None => Preload::Default,
        };
        self.paginate(&Filter::Tree(parsed.filter), &parsed.sort, page, &preload)
            .await
    }

    fn raw_base(&self) -> StoreQuery {
        self.base_query()
            .visibility(Visibility::Live)
            .sort(self.db.config().default_sort.clone())
    }

    async fn page_of(
        &self,
        query: StoreQuery,
        sort: &[SortField],
        page: PageRequest,
        preload: &Preload,
    ) -> Result<Page<E>> {
        let mut page = self
            .engine()
            .page(query, sort, page, E::schema(), None)
            .await?;
        let rows = std::mem::take(&mut page.items);
        let items = self.hydrate(rows, preload, None).await?;
        Ok(page.with_items(items))
    }
}
