//! Per-tick coalescing of change events.

use std::collections::{BTreeMap, BTreeSet};

use relcalc_core::{ChangeEvent, ChangeKind, RowId, TableId};

/// Invalidation to apply to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// One row changed
    Row(TableId, RowId),
    /// The whole table is stale
    Table(TableId),
}

#[derive(Debug, Default)]
struct TableChanges {
    rows: BTreeSet<RowId>,
    whole_table: bool,
}

/// Change events collected during one tick.
#[derive(Debug, Default)]
pub struct ChangeBatch {
    tables: BTreeMap<TableId, TableChanges>,
    events: usize,
}

impl ChangeBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event. Repeated events for the same row collapse.
    pub fn push(&mut self, event: ChangeEvent) {
        self.events += 1;
        let changes = self.tables.entry(event.table).or_default();
        match (event.kind, event.row_id) {
            (ChangeKind::Bulk | ChangeKind::SchemaChanged, _) | (_, None) => {
                changes.whole_table = true;
            }
            (_, Some(row)) => {
                changes.rows.insert(row);
            }
        }
    }

    /// Number of events pushed.
    pub fn event_count(&self) -> usize {
        self.events
    }

    /// Returns true if no events were pushed.
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }

    /// Resolves the batch into invalidations, ordered by table.
    ///
    /// A table with more than `bulk_threshold` changed rows is invalidated as
    /// a whole.
    pub fn into_invalidations(self, bulk_threshold: usize) -> Vec<Invalidation> {
        let mut out = Vec::new();
        for (table, changes) in self.tables {
            if changes.whole_table || changes.rows.len() > bulk_threshold {
                out.push(Invalidation::Table(table));
            } else {
                out.extend(
                    changes
                        .rows
                        .into_iter()
                        .map(|row| Invalidation::Row(table.clone(), row)),
                );
            }
        }
        out
    }
}
