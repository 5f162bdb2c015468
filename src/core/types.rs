use super::{DataType, RegistryError, Result, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Audit column names shared by every table.
pub mod audit_columns {
    pub const ID: &str = "id";
    pub const CREATED_AT: &str = "created_at";
    pub const CREATED_BY_ID: &str = "created_by_id";
    pub const UPDATED_AT: &str = "updated_at";
    pub const UPDATED_BY_ID: &str = "updated_by_id";
    pub const DELETED_AT: &str = "deleted_at";
    pub const DELETED_BY_ID: &str = "deleted_by_id";

    /// Columns an update patch may never overwrite.
    pub const IMMUTABLE: [&str; 5] = [ID, CREATED_AT, CREATED_BY_ID, DELETED_AT, DELETED_BY_ID];
}

/// One stored record: column name to value, ordered by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Missing columns read as `Null`.
    pub fn value(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn id(&self) -> Option<Uuid> {
        self.value(audit_columns::ID).as_uuid()
    }

    pub fn is_deleted(&self) -> bool {
        !self.value(audit_columns::DELETED_AT).is_null()
    }

    pub fn uuid(&self, column: &str) -> Result<Uuid> {
        self.required(column, Value::as_uuid)
    }

    pub fn opt_uuid(&self, column: &str) -> Result<Option<Uuid>> {
        self.optional(column, Value::as_uuid)
    }

    pub fn text(&self, column: &str) -> Result<String> {
        self.required(column, |v| v.as_str().map(str::to_string))
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>> {
        self.optional(column, |v| v.as_str().map(str::to_string))
    }

    pub fn i64(&self, column: &str) -> Result<i64> {
        self.required(column, |v| match v {
            Value::Integer(i) => Some(*i),
            _ => None,
        })
    }

    pub fn opt_i64(&self, column: &str) -> Result<Option<i64>> {
        self.optional(column, |v| match v {
            Value::Integer(i) => Some(*i),
            _ => None,
        })
    }

    pub fn f64(&self, column: &str) -> Result<f64> {
        self.required(column, Value::as_f64)
    }

    pub fn bool(&self, column: &str) -> Result<bool> {
        self.required(column, Value::as_bool)
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        self.required(column, Value::as_timestamp)
    }

    pub fn opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        self.optional(column, Value::as_timestamp)
    }

    fn required<T>(&self, column: &str, read: impl Fn(&Value) -> Option<T>) -> Result<T> {
        match self.optional(column, read)? {
            Some(value) => Ok(value),
            None => Err(RegistryError::Validation(format!(
                "Column '{}' is NULL",
                column
            ))),
        }
    }

    fn optional<T>(&self, column: &str, read: impl Fn(&Value) -> Option<T>) -> Result<Option<T>> {
        let value = self.value(column);
        if value.is_null() {
            return Ok(None);
        }
        read(value).map(Some).ok_or_else(|| {
            RegistryError::Validation(format!(
                "Column '{}' holds unexpected {} value",
                column,
                value.type_name()
            ))
        })
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(RegistryError::Validation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(RegistryError::Validation(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// `local_key` on this table references the related row's `id`.
    BelongsTo { local_key: String },
    /// `foreign_key` on the related table references this row's `id`.
    HasMany { foreign_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub table: String,
    pub kind: RelationKind,
}

/// Table layout of one entity type. The audit columns are always present.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    relations: Vec<Relation>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        use audit_columns::*;
        Self {
            name: name.into(),
            columns: vec![
                Column::new(ID, DataType::Uuid).not_null(),
                Column::new(CREATED_AT, DataType::Timestamp).not_null(),
                Column::new(CREATED_BY_ID, DataType::Uuid),
                Column::new(UPDATED_AT, DataType::Timestamp).not_null(),
                Column::new(UPDATED_BY_ID, DataType::Uuid),
                Column::new(DELETED_AT, DataType::Timestamp),
                Column::new(DELETED_BY_ID, DataType::Uuid),
            ],
            relations: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.retain(|c| c.name != column.name);
        self.columns.push(column);
        self
    }

    pub fn belongs_to(
        mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        local_key: impl Into<String>,
    ) -> Self {
        self.relations.push(Relation {
            name: name.into(),
            table: table.into(),
            kind: RelationKind::BelongsTo {
                local_key: local_key.into(),
            },
        });
        self
    }

    pub fn has_many(
        mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.relations.push(Relation {
            name: name.into(),
            table: table.into(),
            kind: RelationKind::HasMany {
                foreign_key: foreign_key.into(),
            },
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|rel| rel.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.get_column(name).ok_or_else(|| {
            RegistryError::Validation(format!(
                "Unknown field '{}' on '{}'",
                name, self.name
            ))
        })
    }

    /// Validates a row and fills absent columns with `Null`.
    pub fn normalize(&self, row: Row) -> Result<Row> {
        if let Some((unknown, _)) = row.iter().find(|(name, _)| self.get_column(name).is_none()) {
            return Err(RegistryError::Validation(format!(
                "Unknown column '{}' for table '{}'",
                unknown, self.name
            )));
        }

        let mut normalized = Row::new();
        for column in &self.columns {
            let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
            let value = match (&column.data_type, value) {
                (DataType::Float, Value::Integer(i)) => Value::Float(i as f64),
                (_, v) => v,
            };
            column.validate(&value)?;
            normalized.set(column.name.clone(), value);
        }
        Ok(normalized)
    }
}
