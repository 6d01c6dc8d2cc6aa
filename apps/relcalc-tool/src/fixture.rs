//! JSON fixture files: tables with stored column definitions and rows.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use relcalc_core::{MemoryStore, RawColumn, Row, Schema, TableId};
use serde::Deserialize;

/// One table of a fixture.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureTable {
    pub id: TableId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<RawColumn>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl FixtureTable {
    /// Decoded schema; undecodable columns become invalid columns.
    pub fn schema(&self) -> Schema {
        Schema::from_raw(self.id.clone(), &self.columns)
    }
}

/// A set of tables.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub tables: Vec<FixtureTable>,
}

impl Fixture {
    /// Reads and parses a fixture file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse fixture {}", path.display()))?;
        tracing::info!(
            "Loaded fixture {} with {} tables",
            path.display(),
            fixture.tables.len()
        );
        Ok(fixture)
    }

    /// Looks up a table.
    pub fn table(&self, id: &TableId) -> Option<&FixtureTable> {
        self.tables.iter().find(|t| &t.id == id)
    }

    /// Loads every table into a memory store.
    pub fn to_store(&self) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for table in &self.tables {
            store.create_table(table.schema(), table.rows.clone());
            tracing::debug!("Table {} ({}): {} rows", table.id, table.name, table.rows.len());
        }
        store
    }
}
