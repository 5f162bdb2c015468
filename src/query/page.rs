use crate::core::{RegistryError, Result};
use crate::filter::SortField;
use serde::Serialize;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_index: usize,
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self {
            page_index,
            page_size,
        }
    }

    pub fn first(page_size: usize) -> Self {
        Self::new(1, page_size)
    }

    pub fn next(&self) -> Self {
        Self::new(self.page_index + 1, self.page_size)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.page_index == 0 {
            return Err(RegistryError::Validation(
                "page_index is 1-based and must be > 0".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(RegistryError::Validation(
                "page_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One page of results plus count metadata.
///
/// `items` and `total_size` come from two separate store reads, so under
/// concurrent writes they may briefly disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(rename = "data")]
    pub items: Vec<T>,
    pub total_size: usize,
    #[serde(rename = "totalPage")]
    pub total_pages: usize,
    pub page_index: usize,
    pub page_size: usize,
    pub sort: Vec<SortField>,
}

impl<T> Page<T> {
    pub fn total_pages_for(total_size: usize, page_size: usize) -> usize {
        if page_size == 0 {
            0
        } else {
            total_size.div_ceil(page_size)
        }
    }

    pub fn has_next(&self) -> bool {
        self.page_index < self.total_pages
    }

    pub fn map<U>(mut self, f: impl FnMut(T) -> U) -> Page<U> {
        let items = std::mem::take(&mut self.items).into_iter().map(f).collect();
        self.with_items(items)
    }

    /// Same metadata, different items.
    pub fn with_items<U>(self, items: Vec<U>) -> Page<U> {
        Page {
            items,
            total_size: self.total_size,
            total_pages: self.total_pages,
            page_index: self.page_index,
            page_size: self.page_size,
            sort: self.sort,
        }
    }

    pub fn try_map<U>(mut self, f: impl FnMut(T) -> Result<U>) -> Result<Page<U>> {
        let items = std::mem::take(&mut self.items)
            .into_iter()
            .map(f)
            .collect::<Result<Vec<_>>>()?;
        Ok(self.with_items(items))
    }
}
