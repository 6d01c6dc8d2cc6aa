//! Table schemas, column definitions, and relation configuration.

mod column;
pub mod formula;
mod relation;
pub(crate) mod validation;

pub use column::{
    Column, ColumnKind, DateConfig, LookupConfig, NumberConfig, RatingConfig, RawColumn,
    RollupConfig,
};
pub use formula::{Formula, FormulaError};
pub use relation::{parse_links, Cardinality, RelationConfig};
pub use validation::SchemaIssue;

use crate::row::{ColumnId, TableId};

/// Ordered column schema of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Table identifier
    pub table_id: TableId,
    /// Columns in display order
    pub columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema from typed columns.
    pub fn new(table_id: impl Into<TableId>, columns: Vec<Column>) -> Self {
        Self {
            table_id: table_id.into(),
            columns,
        }
    }

    /// Decodes stored column definitions.
    pub fn from_raw(table_id: impl Into<TableId>, columns: &[RawColumn]) -> Self {
        Self {
            table_id: table_id.into(),
            columns: columns.iter().map(Column::from_raw).collect(),
        }
    }

    /// Looks up a column by id.
    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    /// Looks up a column by name (case-insensitive).
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Returns the relation config of `id`, if it is a relation column.
    pub fn relation(&self, id: &ColumnId) -> Option<&RelationConfig> {
        match self.column(id).map(|c| &c.kind) {
            Some(ColumnKind::Relation(cfg)) => Some(cfg),
            _ => None,
        }
    }
}
