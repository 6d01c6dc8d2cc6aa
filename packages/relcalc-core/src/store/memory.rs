//! In-process row store.
//!
//! Holds tables in memory, counts requests per table, and publishes a
//! [`ChangeEvent`] for every mutation, the way a backend realtime channel
//! would.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::row::{ColumnId, Row, RowId, TableId};
use crate::schema::Schema;

use super::events::{ChangeEvent, ChangeKind};
use super::RowStore;

/// Capacity of the change-event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Request counters for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of `get_rows` calls
    pub get_rows_calls: u64,
    /// Total ids requested across `get_rows` calls
    pub rows_requested: u64,
    /// Number of `get_schema` calls
    pub schema_calls: u64,
}

#[derive(Debug)]
struct MemoryTable {
    schema: Schema,
    rows: HashMap<RowId, Row>,
}

/// Row store holding all tables in memory.
#[derive(Debug)]
pub struct MemoryStore {
    /// Map of table id to table contents
    tables: RwLock<HashMap<TableId, MemoryTable>>,
    /// Request counters per table
    stats: Mutex<HashMap<TableId, StoreStats>>,
    /// When set, every read fails with `Unavailable`
    unavailable: AtomicBool,
    /// Artificial latency applied to every read
    latency: Mutex<Duration>,
    /// Change notifications
    events: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tables: RwLock::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            latency: Mutex::new(Duration::ZERO),
            events,
        }
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: ChangeEvent) {
        // No subscribers is fine: nobody caches anything yet.
        let _ = self.events.send(event);
    }

    /// Makes every subsequent read fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every subsequent read.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Returns request counters for a table.
    pub fn stats(&self, table: &TableId) -> StoreStats {
        self.stats.lock().get(table).copied().unwrap_or_default()
    }

    /// Resets all request counters.
    pub fn reset_stats(&self) {
        self.stats.lock().clear();
    }

    /// Returns the ids of all tables.
    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.read().keys().cloned().collect()
    }

    /// Number of rows in a table (0 if it does not exist).
    pub fn row_count(&self, table: &TableId) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.rows.len())
    }

    /// Creates a table or replaces an existing one entirely.
    pub fn create_table(&self, schema: Schema, rows: Vec<Row>) {
        let table_id = schema.table_id.clone();
        let rows = rows.into_iter().map(|r| (r.id.clone(), r)).collect();
        self.tables
            .write()
            .insert(table_id.clone(), MemoryTable { schema, rows });
        self.publish(ChangeEvent::table(table_id, ChangeKind::Bulk));
    }

    /// Deletes a table and all its rows.
    pub fn drop_table(&self, table: &TableId) -> Result<(), StoreError> {
        self.tables
            .write()
            .remove(table)
            .ok_or_else(|| not_found(table))?;
        self.publish(ChangeEvent::table(table.clone(), ChangeKind::Bulk));
        Ok(())
    }

    /// Replaces a table's schema, keeping its rows.
    pub fn set_schema(&self, schema: Schema) -> Result<(), StoreError> {
        let table_id = schema.table_id.clone();
        {
            let mut tables = self.tables.write();
            let table = tables.get_mut(&table_id).ok_or_else(|| not_found(&table_id))?;
            table.schema = schema;
        }
        self.publish(ChangeEvent::table(table_id, ChangeKind::SchemaChanged));
        Ok(())
    }

    /// Inserts a row, replacing any row with the same id.
    pub fn insert_row(&self, table: &TableId, row: Row) -> Result<(), StoreError> {
        let row_id = row.id.clone();
        let replaced = {
            let mut tables = self.tables.write();
            let t = tables.get_mut(table).ok_or_else(|| not_found(table))?;
            t.rows.insert(row_id.clone(), row).is_some()
        };
        let kind = if replaced {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        self.publish(ChangeEvent::row(table.clone(), row_id, kind));
        Ok(())
    }

    /// Sets one value on an existing row. Returns false if the row is missing.
    pub fn update_value(
        &self,
        table: &TableId,
        row_id: &RowId,
        column: &ColumnId,
        value: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let updated = {
            let mut tables = self.tables.write();
            let t = tables.get_mut(table).ok_or_else(|| not_found(table))?;
            match t.rows.get_mut(row_id) {
                Some(row) => {
                    row.set(column.clone(), value);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.publish(ChangeEvent::row(table.clone(), row_id.clone(), ChangeKind::Update));
        }
        Ok(updated)
    }

    /// Deletes a row. Returns false if it did not exist.
    pub fn delete_row(&self, table: &TableId, row_id: &RowId) -> Result<bool, StoreError> {
        let removed = {
            let mut tables = self.tables.write();
            let t = tables.get_mut(table).ok_or_else(|| not_found(table))?;
            t.rows.remove(row_id).is_some()
        };
        if removed {
            self.publish(ChangeEvent::row(table.clone(), row_id.clone(), ChangeKind::Delete));
        }
        Ok(removed)
    }

    /// Removes every row of a table.
    pub fn clear_table(&self, table: &TableId) -> Result<(), StoreError> {
        {
            let mut tables = self.tables.write();
            let t = tables.get_mut(table).ok_or_else(|| not_found(table))?;
            t.rows.clear();
        }
        self.publish(ChangeEvent::table(table.clone(), ChangeKind::Bulk));
        Ok(())
    }

    /// Inserts many rows as one bulk change.
    pub fn import_rows(&self, table: &TableId, rows: Vec<Row>) -> Result<usize, StoreError> {
        let count = rows.len();
        {
            let mut tables = self.tables.write();
            let t = tables.get_mut(table).ok_or_else(|| not_found(table))?;
            t.rows.extend(rows.into_iter().map(|r| (r.id.clone(), r)));
        }
        self.publish(ChangeEvent::table(table.clone(), ChangeKind::Bulk));
        Ok(count)
    }

    async fn before_read(&self) -> Result<(), StoreError> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(table: &TableId) -> StoreError {
    StoreError::TableNotFound {
        table: table.to_string(),
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn get_rows(
        &self,
        table: &TableId,
        rows: &BTreeSet<RowId>,
    ) -> Result<HashMap<RowId, Row>, StoreError> {
        {
            let mut stats = self.stats.lock();
            let entry = stats.entry(table.clone()).or_default();
            entry.get_rows_calls += 1;
            entry.rows_requested += rows.len() as u64;
        }
        self.before_read().await?;

        let tables = self.tables.read();
        let t = tables.get(table).ok_or_else(|| not_found(table))?;
        Ok(rows
            .iter()
            .filter_map(|id| t.rows.get(id).map(|row| (id.clone(), row.clone())))
            .collect())
    }

    async fn get_schema(&self, table: &TableId) -> Result<Schema, StoreError> {
        self.stats.lock().entry(table.clone()).or_default().schema_calls += 1;
        self.before_read().await?;

        self.tables
            .read()
            .get(table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| not_found(table))
    }
}
