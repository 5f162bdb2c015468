// ============================================================================
// Sort keys and row comparator
// ============================================================================
//
// Multi-key ordering over stored rows:
// - NULLS LAST for ASC, NULLS FIRST for DESC
// - the identity column is always the final key so pages are stable
//
// ============================================================================

use crate::core::{Result, Row, TableSchema, Value, audit_columns};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Lenient parse: anything other than `desc` is ascending.
    pub fn parse_lenient(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

/// One `(field, direction)` sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(rename = "order", default)]
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Strategy for placing NULL values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl NullOrdering {
    pub fn default_for_direction(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Desc => Self::NullsFirst,
            SortDirection::Asc => Self::NullsLast,
        }
    }
}

/// Validates the requested keys against the schema, falls back to `default`
/// when empty, and appends `id ASC` unless `id` is already a key.
pub fn resolve_sort(
    requested: &[SortField],
    default: &[SortField],
    schema: &TableSchema,
) -> Result<Vec<SortField>> {
    let source = if requested.is_empty() { default } else { requested };

    let mut effective = Vec::with_capacity(source.len() + 1);
    for key in source {
        schema.require_column(&key.field)?;
        effective.push(key.clone());
    }

    if !effective.iter().any(|key| key.field == audit_columns::ID) {
        effective.push(SortField::asc(audit_columns::ID));
    }
    Ok(effective)
}

/// Compares rows key by key.
pub struct RowComparator<'a> {
    keys: &'a [SortField],
}

impl<'a> RowComparator<'a> {
    pub fn new(keys: &'a [SortField]) -> Self {
        Self { keys }
    }

    pub fn compare(&self, left: &Row, right: &Row) -> Ordering {
        for key in self.keys {
            let ordering = compare_by_key(left.value(&key.field), right.value(&key.field), key);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable sort in place.
    pub fn sort(&self, rows: &mut [Row]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }
}

fn compare_by_key(left: &Value, right: &Value, key: &SortField) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) | (false, true) => {
            let null_first = NullOrdering::default_for_direction(key.direction)
                == NullOrdering::NullsFirst;
            return match (left.is_null(), null_first) {
                (true, true) | (false, false) => Ordering::Less,
                _ => Ordering::Greater,
            };
        }
        _ => {}
    }

    let ordering = left.sort_cmp(right);
    match key.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}
