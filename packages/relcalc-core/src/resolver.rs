//! Relation resolver: turns relation ids into target rows and labels.

use std::collections::BTreeSet;

use crate::config::DisplayOptions;
use crate::display::get_display_value;
use crate::error::Result;
use crate::loader::BatchLoader;
use crate::row::{ColumnId, Row, RowId, TableId};
use crate::schema::Schema;

/// Column names tried, in order, when a relation has no usable display field.
const LABEL_COLUMNS: [&str; 4] = ["name", "title", "label", "email"];

/// A target row with its label.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    pub row: Row,
    pub display_value: String,
}

/// Resolves relation references through the batch loader.
#[derive(Clone)]
pub struct RelationResolver {
    loader: BatchLoader,
    display: DisplayOptions,
}

impl RelationResolver {
    /// Creates a resolver.
    pub fn new(loader: BatchLoader, display: DisplayOptions) -> Self {
        Self { loader, display }
    }

    /// Resolves one reference. A missing target is `Ok(None)`.
    pub async fn resolve_single(
        &self,
        target: &Schema,
        row_id: &RowId,
        display_field: Option<&ColumnId>,
    ) -> Result<Option<ResolvedRow>> {
        let row = self.loader.load_one(&target.table_id, row_id).await?;
        Ok(row.map(|row| self.labelled(target, row, display_field)))
    }

    /// Resolves references in order.
    ///
    /// All ids are fetched in one batch. Missing targets are skipped; an id
    /// listed twice appears twice.
    pub async fn resolve_many(
        &self,
        target: &Schema,
        row_ids: &[RowId],
        display_field: Option<&ColumnId>,
    ) -> Result<Vec<ResolvedRow>> {
        Ok(self
            .fetch_ordered(&target.table_id, row_ids)
            .await?
            .into_iter()
            .map(|row| self.labelled(target, row, display_field))
            .collect())
    }

    /// Fetches target rows in reference order, skipping missing ones.
    pub async fn fetch_ordered(&self, table: &TableId, row_ids: &[RowId]) -> Result<Vec<Row>> {
        let unique: BTreeSet<RowId> = row_ids.iter().cloned().collect();
        let batch = self.loader.load(table, &unique).await?;
        Ok(row_ids
            .iter()
            .filter_map(|id| batch.get(id).cloned())
            .collect())
    }

    /// Returns true if the target row exists.
    pub async fn exists(&self, table: &TableId, row_id: &RowId) -> Result<bool> {
        Ok(self.loader.load_one(table, row_id).await?.is_some())
    }

    fn labelled(&self, target: &Schema, row: Row, display_field: Option<&ColumnId>) -> ResolvedRow {
        let display_value = row_label(&row, target, display_field, &self.display);
        ResolvedRow { row, display_value }
    }
}

/// Human-readable label of a row.
///
/// Uses the display field when it has a value, then the first non-empty of
/// the `name`/`title`/`label`/`email` columns, then the row id.
pub fn row_label(
    row: &Row,
    schema: &Schema,
    display_field: Option<&ColumnId>,
    options: &DisplayOptions,
) -> String {
    if let Some(column) = display_field.and_then(|id| schema.column(id)) {
        let value = get_display_value(row, column, options);
        if !value.is_empty() {
            return value;
        }
    }

    LABEL_COLUMNS
        .iter()
        .filter_map(|name| schema.column_by_name(name))
        .filter(|column| !column.kind.is_derived())
        .map(|column| get_display_value(row, column, options))
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| row.id.to_string())
}
