//! Derived-cell cache with event-driven invalidation.
//!
//! Entries are keyed by `(table, row, column)` and expire after a TTL even
//! without events, so a dropped realtime message only delays freshness.
//! Every invalidation bumps a per-table epoch; a computation that started
//! before the bump is not stored.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::evaluator::CellDisplayValue;
use crate::row::{ColumnId, RowId, TableId};
use crate::schema::Schema;

/// Identifies one cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub table: TableId,
    pub row: RowId,
    pub column: ColumnId,
}

impl CellKey {
    /// Creates a cell key.
    pub fn new(
        table: impl Into<TableId>,
        row: impl Into<RowId>,
        column: impl Into<ColumnId>,
    ) -> Self {
        Self {
            table: table.into(),
            row: row.into(),
            column: column.into(),
        }
    }
}

/// Target rows a cached value was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Target table
    pub table: TableId,
    /// Every referenced id, including ones that did not resolve
    pub rows: BTreeSet<RowId>,
}

/// A cached cell value.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Computed value
    pub value: CellDisplayValue,
    /// Monotonic stamp assigned on insert
    pub version: u64,
    /// Insert time
    pub stored_at: Instant,
    /// Expiry time
    pub expires_at: Instant,
    /// Target rows the value depends on
    pub dependency: Option<Dependency>,
}

/// Invalidation epochs observed at the start of a computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpochSnapshot {
    epochs: HashMap<TableId, u64>,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub invalidations: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CellKey, CacheEntry>,
    schemas: HashMap<TableId, (Arc<Schema>, Instant)>,
    epochs: HashMap<TableId, u64>,
    next_version: u64,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl CacheState {
    fn bump(&mut self, table: &TableId) {
        *self.epochs.entry(table.clone()).or_insert(0) += 1;
    }

    fn is_current(&self, observed: &EpochSnapshot) -> bool {
        observed
            .epochs
            .iter()
            .all(|(table, epoch)| self.epochs.get(table).copied().unwrap_or(0) == *epoch)
    }

    fn retain(&mut self, mut keep: impl FnMut(&CellKey, &CacheEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, e| keep(k, e));
        let removed = before - self.entries.len();
        self.invalidations += removed as u64;
        removed
    }
}

/// Session-scoped cache of derived cell values and table schemas.
pub struct DerivedCache {
    state: Mutex<CacheState>,
    schema_ttl: Duration,
}

impl DerivedCache {
    /// Creates an empty cache. `schema_ttl` bounds how long schemas are reused.
    pub fn new(schema_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            schema_ttl,
        }
    }

    /// Returns a fresh entry, removing it if it has expired.
    pub fn get(&self, key: &CellKey) -> Option<CacheEntry> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let found = state
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now, entry.clone()));
        match found {
            Some((true, entry)) => {
                state.hits += 1;
                Some(entry)
            }
            Some((false, _)) => {
                state.entries.remove(key);
                state.misses += 1;
                None
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Records the current epoch of `table` in `snapshot` (first observation wins).
    pub fn observe(&self, snapshot: &mut EpochSnapshot, table: &TableId) {
        if snapshot.epochs.contains_key(table) {
            return;
        }
        let epoch = self.state.lock().epochs.get(table).copied().unwrap_or(0);
        snapshot.epochs.insert(table.clone(), epoch);
    }

    /// Stores a value unless a table in `observed` was invalidated since.
    ///
    /// Returns whether the value was stored.
    pub fn put(
        &self,
        key: CellKey,
        value: CellDisplayValue,
        dependency: Option<Dependency>,
        ttl: Duration,
        observed: &EpochSnapshot,
    ) -> bool {
        let mut state = self.state.lock();
        if !state.is_current(observed) {
            tracing::debug!("Discarding stale value for {:?}", key);
            return false;
        }
        let now = Instant::now();
        state.next_version += 1;
        let version = state.next_version;
        state.entries.insert(
            key,
            CacheEntry {
                value,
                version,
                stored_at: now,
                expires_at: now + ttl,
                dependency,
            },
        );
        true
    }

    /// Drops the derived entries of a row and every entry that referenced it.
    pub fn invalidate(&self, table: &TableId, row: &RowId) -> usize {
        let mut state = self.state.lock();
        state.bump(table);
        state.retain(|key, entry| {
            let own = &key.table == table && &key.row == row;
            let dependent = entry
                .dependency
                .as_ref()
                .is_some_and(|d| &d.table == table && d.rows.contains(row));
            !(own || dependent)
        })
    }

    /// Drops every entry in, or depending on, `table`, and its cached schema.
    pub fn invalidate_targets(&self, table: &TableId) -> usize {
        let mut state = self.state.lock();
        state.bump(table);
        state.schemas.remove(table);
        state.retain(|key, entry| {
            &key.table != table
                && entry
                    .dependency
                    .as_ref()
                    .map_or(true, |d| &d.table != table)
        })
    }

    /// Drops one column's entries, entries depending on the table, and the
    /// table's cached schema. Used when a column is reconfigured.
    pub fn invalidate_column(&self, table: &TableId, column: &ColumnId) -> usize {
        let mut state = self.state.lock();
        state.bump(table);
        state.schemas.remove(table);
        state.retain(|key, entry| {
            let own = &key.table == table && &key.column == column;
            let dependent = entry.dependency.as_ref().is_some_and(|d| &d.table == table);
            !(own || dependent)
        })
    }

    /// Returns a cached schema that has not expired.
    pub fn get_schema(&self, table: &TableId) -> Option<Arc<Schema>> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let found = state
            .schemas
            .get(table)
            .map(|(schema, expires_at)| (*expires_at > now, schema.clone()));
        match found {
            Some((true, schema)) => Some(schema),
            Some((false, _)) => {
                state.schemas.remove(table);
                None
            }
            None => None,
        }
    }

    /// Caches a schema unless the table was invalidated since `observed`.
    pub fn put_schema(&self, schema: Arc<Schema>, observed: &EpochSnapshot) {
        let mut state = self.state.lock();
        if state.is_current(observed) {
            let expires_at = Instant::now() + self.schema_ttl;
            state
                .schemas
                .insert(schema.table_id.clone(), (schema, expires_at));
        }
    }

    /// Removes expired entries and schemas. Returns the number of entries removed.
    pub fn prune_expired(&self) -> usize {
        let mut state = self.state.lock();
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, e| e.expires_at > now);
        state.schemas.retain(|_, (_, expires_at)| *expires_at > now);
        before - state.entries.len()
    }

    /// Number of cached cell values (including expired, not yet pruned ones).
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if no cell values are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything and bumps every known epoch.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let tables: Vec<TableId> = state.epochs.keys().cloned().collect();
        for table in &tables {
            state.bump(table);
        }
        state.entries.clear();
        state.schemas.clear();
    }

    /// Returns hit/miss counters and the current size.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.entries.len(),
            invalidations: state.invalidations,
        }
    }
}
