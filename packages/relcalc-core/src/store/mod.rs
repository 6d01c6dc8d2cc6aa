//! Row store adapter.
//!
//! The engine only reads through [`RowStore`]. A missing row is a normal
//! result, not an error: relation targets may legitimately be deleted.

mod events;
mod memory;

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::row::{Row, RowId, TableId};
use crate::schema::Schema;

pub use events::{ChangeEvent, ChangeKind};
pub use memory::{MemoryStore, StoreStats};

/// Read access to tables, rows, and schemas.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Fetches the rows with the given ids in a single request.
    ///
    /// Ids with no row are absent from the result.
    async fn get_rows(
        &self,
        table: &TableId,
        rows: &BTreeSet<RowId>,
    ) -> Result<HashMap<RowId, Row>, StoreError>;

    /// Fetches the ordered column schema of a table.
    async fn get_schema(&self, table: &TableId) -> Result<Schema, StoreError>;

    /// Fetches one row.
    async fn get_row(&self, table: &TableId, row: &RowId) -> Result<Option<Row>, StoreError> {
        let ids = BTreeSet::from([row.clone()]);
        let mut rows = self.get_rows(table, &ids).await?;
        Ok(rows.remove(row))
    }
}
