//! Change notifications delivered by the backend's realtime channel.

use serde::{Deserialize, Serialize};

use crate::row::{RowId, TableId};

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Import, clear, or delete of a whole table
    Bulk,
    /// Columns added, removed, or reconfigured
    SchemaChanged,
}

/// A row or table change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Changed table
    pub table: TableId,
    /// Changed row (None for bulk and schema changes)
    #[serde(default)]
    pub row_id: Option<RowId>,
    /// What happened
    #[serde(alias = "change_type")]
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Row-level event.
    pub fn row(table: impl Into<TableId>, row_id: impl Into<RowId>, kind: ChangeKind) -> Self {
        Self {
            table: table.into(),
            row_id: Some(row_id.into()),
            kind,
        }
    }

    /// Whole-table event.
    pub fn table(table: impl Into<TableId>, kind: ChangeKind) -> Self {
        Self {
            table: table.into(),
            row_id: None,
            kind,
        }
    }
}
