//! Identifiers and rows.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

static NULL: serde_json::Value = serde_json::Value::Null;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Opaque table identifier.
    TableId
);
id_type!(
    /// Opaque row identifier, stable for the row's lifetime.
    RowId
);
id_type!(
    /// Opaque column identifier, stable across renames.
    ColumnId
);

/// A stored row: raw values keyed by column id.
///
/// Derived columns (lookup, rollup, formula) never have an entry here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    /// Row identifier
    pub id: RowId,
    /// Raw values by column id
    #[serde(default)]
    pub values: HashMap<ColumnId, serde_json::Value>,
}

impl Row {
    /// Creates an empty row.
    pub fn new(id: impl Into<RowId>) -> Self {
        Self {
            id: id.into(),
            values: HashMap::new(),
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, column: impl Into<ColumnId>, value: serde_json::Value) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    /// Returns the raw value of a column, or `Null` when absent.
    pub fn get(&self, column: &ColumnId) -> &serde_json::Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    /// Sets a raw value.
    pub fn set(&mut self, column: impl Into<ColumnId>, value: serde_json::Value) {
        self.values.insert(column.into(), value);
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self(String::new())
    }
}
