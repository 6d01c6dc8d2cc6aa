//! Column definitions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateFunction;
use crate::error::ConfigError;
use crate::row::ColumnId;

use super::formula::Formula;
use super::relation::RelationConfig;

/// Column definition as it is stored: a type name plus a free-form config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    /// Stable column id
    pub id: ColumnId,
    /// Display name
    pub name: String,
    /// Type name (`text`, `relation`, `rollup`, ...)
    #[serde(rename = "type", alias = "column_type")]
    pub column_type: String,
    /// Type-specific config object
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Number column settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NumberConfig {
    /// Fixed number of decimals (None = as stored)
    #[serde(default)]
    pub precision: Option<u8>,
}

/// Date column settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DateConfig {
    /// chrono format string
    #[serde(default, alias = "date_format")]
    pub format: Option<String>,
}

/// Rating column settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RatingConfig {
    /// Highest rating
    #[serde(default = "default_rating_max")]
    pub max: u8,
}

fn default_rating_max() -> u8 {
    5
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            max: default_rating_max(),
        }
    }
}

/// Lookup column: displays a field of the linked row(s).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LookupConfig {
    /// Relation column in the same table
    #[serde(alias = "relation_column_id")]
    pub source_relation_column_id: ColumnId,
    /// Column in the target table
    #[serde(alias = "target_field", alias = "target_column")]
    pub target_field_id: ColumnId,
}

/// Rollup column: aggregates a field over all linked rows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RollupConfig {
    /// Relation column in the same table
    #[serde(alias = "relation_column_id")]
    pub source_relation_column_id: ColumnId,
    /// Column in the target table
    #[serde(alias = "target_field", alias = "target_column")]
    pub target_field_id: ColumnId,
    /// Aggregate function
    #[serde(alias = "aggregation")]
    pub function: AggregateFunction,
    /// Separator for `concat`
    #[serde(default)]
    pub separator: Option<String>,
}

#[derive(Deserialize)]
struct FormulaConfig {
    expression: String,
}

/// Column type with its type-specific configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Text,
    Number(NumberConfig),
    Date(DateConfig),
    Boolean,
    Select,
    MultiSelect,
    Rating(RatingConfig),
    Percent,
    Duration,
    Email,
    Url,
    Phone,
    File,
    Relation(RelationConfig),
    Lookup(LookupConfig),
    Rollup(RollupConfig),
    Formula(Formula),
    /// Stored config could not be decoded
    Invalid { type_name: String, reason: String },
}

impl ColumnKind {
    /// Type name as stored.
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Number(_) => "number",
            ColumnKind::Date(_) => "date",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Select => "select",
            ColumnKind::MultiSelect => "multi_select",
            ColumnKind::Rating(_) => "rating",
            ColumnKind::Percent => "percent",
            ColumnKind::Duration => "duration",
            ColumnKind::Email => "email",
            ColumnKind::Url => "url",
            ColumnKind::Phone => "phone",
            ColumnKind::File => "file",
            ColumnKind::Relation(_) => "relation",
            ColumnKind::Lookup(_) => "lookup",
            ColumnKind::Rollup(_) => "rollup",
            ColumnKind::Formula(_) => "formula",
            ColumnKind::Invalid { .. } => "invalid",
        }
    }

    /// Lookup, rollup and formula columns have no stored value.
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            ColumnKind::Lookup(_) | ColumnKind::Rollup(_) | ColumnKind::Formula(_)
        )
    }

    /// Whether numeric aggregates make sense over this column.
    pub fn is_numeric_capable(&self) -> bool {
        matches!(
            self,
            ColumnKind::Number(_)
                | ColumnKind::Percent
                | ColumnKind::Rating(_)
                | ColumnKind::Duration
                | ColumnKind::Text
        )
    }

    /// Relation column this kind reads through, if it is derived.
    pub fn source_relation(&self) -> Option<&ColumnId> {
        match self {
            ColumnKind::Lookup(cfg) => Some(&cfg.source_relation_column_id),
            ColumnKind::Rollup(cfg) => Some(&cfg.source_relation_column_id),
            ColumnKind::Formula(formula) => Some(&formula.relation_column_id),
            _ => None,
        }
    }
}

/// A column of a table schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Stable id
    pub id: ColumnId,
    /// Display name (mutable)
    pub name: String,
    /// Type and config
    pub kind: ColumnKind,
}

fn decode<T: DeserializeOwned>(type_name: &str, config: &serde_json::Value) -> Result<T, ConfigError> {
    let config = if config.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        config.clone()
    };
    serde_json::from_value(config).map_err(|e| ConfigError::InvalidConfig {
        type_name: type_name.to_string(),
        reason: e.to_string(),
    })
}

impl Column {
    /// Creates a column.
    pub fn new(id: impl Into<ColumnId>, name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }

    /// Decodes a stored column definition.
    pub fn try_from_raw(raw: &RawColumn) -> Result<Self, ConfigError> {
        let type_name = raw.column_type.trim().to_ascii_lowercase();
        let config = &raw.config;
        let kind = match type_name.as_str() {
            "text" => ColumnKind::Text,
            "number" => ColumnKind::Number(decode(&type_name, config)?),
            "date" => ColumnKind::Date(decode(&type_name, config)?),
            "boolean" | "checkbox" => ColumnKind::Boolean,
            "select" => ColumnKind::Select,
            "multi_select" | "multi-select" => ColumnKind::MultiSelect,
            "rating" => ColumnKind::Rating(decode(&type_name, config)?),
            "percent" => ColumnKind::Percent,
            "duration" => ColumnKind::Duration,
            "email" => ColumnKind::Email,
            "url" => ColumnKind::Url,
            "phone" => ColumnKind::Phone,
            "file" => ColumnKind::File,
            "relation" => ColumnKind::Relation(decode(&type_name, config)?),
            "lookup" => ColumnKind::Lookup(decode(&type_name, config)?),
            "rollup" => ColumnKind::Rollup(decode(&type_name, config)?),
            "formula" => {
                let cfg: FormulaConfig = decode(&type_name, config)?;
                ColumnKind::Formula(Formula::parse(&cfg.expression)?)
            }
            _ => return Err(ConfigError::UnknownType(raw.column_type.clone())),
        };
        Ok(Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            kind,
        })
    }

    /// Decodes a stored column definition, keeping undecodable columns as
    /// [`ColumnKind::Invalid`] so sibling columns stay usable.
    pub fn from_raw(raw: &RawColumn) -> Self {
        match Self::try_from_raw(raw) {
            Ok(column) => column,
            Err(e) => {
                tracing::warn!("Column '{}' has an invalid definition: {}", raw.id, e);
                Self {
                    id: raw.id.clone(),
                    name: raw.name.clone(),
                    kind: ColumnKind::Invalid {
                        type_name: raw.column_type.clone(),
                        reason: e.to_string(),
                    },
                }
            }
        }
    }
}
