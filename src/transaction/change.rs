// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Command Pattern: every write made inside a transaction is recorded as a
// Change. Nothing reaches the store until COMMIT, where the whole log is
// validated and applied in one step. ROLLBACK simply drops the log.
//
// ============================================================================

use crate::core::Row;
use uuid::Uuid;

/// A single buffered write.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Insert a new row; its identity is the row's `id` column.
    Insert { table: String, row: Row },

    /// Replace the stored row with this identity.
    Update { table: String, id: Uuid, row: Row },

    /// Physically remove the row with this identity.
    Delete { table: String, id: Uuid },
}

impl Change {
    /// Get the table name affected by this change
    pub fn table_name(&self) -> &str {
        match self {
            Change::Insert { table, .. } => table,
            Change::Update { table, .. } => table,
            Change::Delete { table, .. } => table,
        }
    }

    /// Identity of the affected row, if the insert row carries one.
    pub fn row_id(&self) -> Option<Uuid> {
        match self {
            Change::Insert { row, .. } => row.id(),
            Change::Update { id, .. } | Change::Delete { id, .. } => Some(*id),
        }
    }
}

/// Replays `changes` on top of committed rows, yielding what the writing
/// transaction itself sees.
pub fn overlay<'a>(rows: &mut Vec<Row>, changes: impl IntoIterator<Item = &'a Change>) {
    for change in changes {
        match change {
            Change::Insert { row, .. } => {
                let id = row.id();
                rows.retain(|existing| existing.id() != id);
                rows.push(row.clone());
            }
            Change::Update { id, row, .. } => {
                if let Some(existing) = rows.iter_mut().find(|r| r.id() == Some(*id)) {
                    *existing = row.clone();
                }
            }
            Change::Delete { id, .. } => rows.retain(|existing| existing.id() != Some(*id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: Uuid, n: i64) -> Row {
        Row::new().with("id", id).with("n", n)
    }

    #[test]
    fn test_change_table_name() {
        let id = Uuid::new_v4();
        let change = Change::Insert {
            table: "banks".to_string(),
            row: row(id, 1),
        };
        assert_eq!(change.table_name(), "banks");
        assert_eq!(change.row_id(), Some(id));
    }

    #[test]
    fn test_overlay_replays_in_order() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut rows = vec![row(a, 1), row(b, 2)];
        let changes = vec![
            Change::Insert {
                table: "t".into(),
                row: row(c, 3),
            },
            Change::Update {
                table: "t".into(),
                id: a,
                row: row(a, 10),
            },
            Change::Delete {
                table: "t".into(),
                id: b,
            },
        ];

        overlay(&mut rows, &changes);

        let ns: Vec<i64> = rows.iter().map(|r| r.i64("n").unwrap()).collect();
        assert_eq!(ns, vec![10, 3]);
    }
}
