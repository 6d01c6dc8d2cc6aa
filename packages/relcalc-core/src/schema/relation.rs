//! Relation column configuration and link parsing.

use serde::{Deserialize, Serialize};

use crate::row::{ColumnId, RowId, TableId};

/// How many target rows a relation cell may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Exactly one target row
    OneToOne,
    /// A set of target rows
    OneToMany,
    /// Single-valued on the source side
    ManyToOne,
    /// Multi-valued on both sides
    ManyToMany,
}

impl Cardinality {
    /// Returns true if a source cell holds a list of ids.
    pub fn is_multi(self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

/// Configuration of a relation column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Table the relation points at
    #[serde(alias = "target_database_id")]
    pub target_table_id: TableId,
    /// Single or multi-valued
    #[serde(alias = "relation_cardinality", alias = "relation_type")]
    pub cardinality: Cardinality,
    /// Target column used as the row label
    #[serde(default, alias = "display_field")]
    pub display_field_id: Option<ColumnId>,
}

/// Parses a relation column's raw value into target row ids.
///
/// Accepts a single id (string or number), an `{ "id": .. }` object, or an
/// array of those. Order and duplicates are preserved; single-valued
/// cardinalities keep only the first id.
pub fn parse_links(raw: &serde_json::Value, cardinality: Cardinality) -> Vec<RowId> {
    let mut ids = Vec::new();
    match raw {
        serde_json::Value::Array(items) => {
            for item in items {
                if let Some(id) = link_id(item) {
                    ids.push(id);
                }
            }
        }
        other => {
            if let Some(id) = link_id(other) {
                ids.push(id);
            }
        }
    }
    if !cardinality.is_multi() && ids.len() > 1 {
        tracing::debug!(
            "Single-valued relation holds {} ids, keeping the first",
            ids.len()
        );
        ids.truncate(1);
    }
    ids
}

fn link_id(value: &serde_json::Value) -> Option<RowId> {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| RowId::new(trimmed))
        }
        serde_json::Value::Number(n) => Some(RowId::new(n.to_string())),
        serde_json::Value::Object(map) => map.get("id").and_then(link_id),
        _ => None,
    }
}
