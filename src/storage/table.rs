use crate::core::{RegistryError, Result, Row, TableSchema};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Committed rows of one table keyed by identity.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<Uuid, Row>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn get(&self, id: &Uuid) -> Option<&Row> {
        self.rows.get(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.rows.contains_key(id)
    }

    pub fn scan(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Validates `row` against the schema and extracts its identity.
    pub fn prepare(&self, row: Row) -> Result<(Uuid, Row)> {
        let row = self.schema.normalize(row)?;
        let id = row.id().ok_or_else(|| {
            RegistryError::Validation(format!(
                "Row for '{}' has no identity",
                self.schema.name()
            ))
        })?;
        Ok((id, row))
    }

    pub(crate) fn put(&mut self, id: Uuid, row: Row) {
        self.rows.insert(id, row);
    }

    pub(crate) fn remove(&mut self, id: &Uuid) -> Option<Row> {
        self.rows.remove(id)
    }
}
