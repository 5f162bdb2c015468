use crate::core::{Result, Row, audit_columns::*};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and lifecycle columns carried by every entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFields {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub created_by_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub updated_by_id: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by_id: Option<Uuid>,
}

impl AuditFields {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn write_to(&self, row: &mut Row) {
        row.set(ID, self.id);
        row.set(CREATED_AT, self.created_at);
        row.set(CREATED_BY_ID, self.created_by_id);
        row.set(UPDATED_AT, self.updated_at);
        row.set(UPDATED_BY_ID, self.updated_by_id);
        row.set(DELETED_AT, self.deleted_at);
        row.set(DELETED_BY_ID, self.deleted_by_id);
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.uuid(ID)?,
            created_at: row.timestamp(CREATED_AT)?,
            created_by_id: row.opt_uuid(CREATED_BY_ID)?,
            updated_at: row.timestamp(UPDATED_AT)?,
            updated_by_id: row.opt_uuid(UPDATED_BY_ID)?,
            deleted_at: row.opt_timestamp(DELETED_AT)?,
            deleted_by_id: row.opt_uuid(DELETED_BY_ID)?,
        })
    }

    /// Stamps identity and timestamps for a first insert.
    pub(crate) fn prepare_create(&mut self, now: DateTime<Utc>) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        self.created_at = now;
        self.updated_at = now;
        self.deleted_at = None;
        self.deleted_by_id = None;
    }
}
