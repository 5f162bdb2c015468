use crate::core::Row;
use crate::filter::{Predicate, SortField};
use std::fmt;
use std::sync::Arc;

/// Caller-supplied transformation of the base store query.
pub type RawQuery = Box<dyn FnOnce(StoreQuery) -> StoreQuery + Send>;

/// Which rows a query may see with respect to soft deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Live,
    IncludingDeleted,
    DeletedOnly,
}

impl Visibility {
    pub fn admits(&self, row: &Row) -> bool {
        match self {
            Self::Live => !row.is_deleted(),
            Self::IncludingDeleted => true,
            Self::DeletedOnly => row.is_deleted(),
        }
    }
}

/// Store-level query: row predicates, soft-delete visibility, ordering and window.
#[derive(Clone)]
pub struct StoreQuery {
    table: String,
    predicates: Vec<Predicate>,
    visibility: Visibility,
    sort: Vec<SortField>,
    offset: usize,
    limit: Option<usize>,
}

impl StoreQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            predicates: Vec::new(),
            visibility: Visibility::Live,
            sort: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds an arbitrary row predicate.
    pub fn where_fn(self, predicate: impl Fn(&Row) -> bool + Send + Sync + 'static) -> Self {
        self.filter(Arc::new(predicate))
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn include_deleted(self, include: bool) -> Self {
        self.visibility(if include {
            Visibility::IncludingDeleted
        } else {
            Visibility::Live
        })
    }

    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Drops offset and limit, keeping predicates and visibility.
    pub fn unbounded(mut self) -> Self {
        self.offset = 0;
        self.limit = None;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn sort_fields(&self) -> &[SortField] {
        &self.sort
    }

    pub fn window(&self) -> (usize, Option<usize>) {
        (self.offset, self.limit)
    }

    pub fn get_visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.visibility.admits(row) && self.predicates.iter().all(|p| p(row))
    }

    /// Restricts the query to one identity.
    pub fn by_id(self, id: uuid::Uuid) -> Self {
        self.where_fn(move |row| row.id() == Some(id))
    }
}

impl fmt::Debug for StoreQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreQuery")
            .field("table", &self.table)
            .field("predicates", &self.predicates.len())
            .field("visibility", &self.visibility)
            .field("sort", &self.sort)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}
