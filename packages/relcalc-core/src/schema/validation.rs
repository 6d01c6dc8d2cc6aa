//! Cross-column schema checks.

use std::collections::HashSet;
use std::fmt;

use crate::error::EngineError;
use crate::row::ColumnId;

use super::{Column, ColumnKind, RelationConfig, Schema};

/// A problem found in a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Offending column
    pub column: ColumnId,
    /// Description
    pub message: String,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.column, self.message)
    }
}

/// Resolves the relation column a derived column reads through.
///
/// The relation must exist in the same schema and be of type relation.
pub(crate) fn source_relation<'a>(
    schema: &'a Schema,
    column: &Column,
    relation_id: &ColumnId,
) -> Result<&'a RelationConfig, EngineError> {
    match schema.column(relation_id).map(|c| &c.kind) {
        Some(ColumnKind::Relation(cfg)) => Ok(cfg),
        Some(other) => Err(EngineError::misconfigured(
            column.id.as_str(),
            format!(
                "source column '{}' is a {} column, not a relation",
                relation_id,
                other.type_name()
            ),
        )),
        None => Err(EngineError::misconfigured(
            column.id.as_str(),
            format!("source relation column '{}' does not exist", relation_id),
        )),
    }
}

impl Schema {
    /// Checks every column and returns all issues found.
    pub fn validate(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for column in &self.columns {
            if !seen.insert(&column.id) {
                issues.push(SchemaIssue {
                    column: column.id.clone(),
                    message: "duplicate column id".to_string(),
                });
            }

            match &column.kind {
                ColumnKind::Invalid { type_name, reason } => issues.push(SchemaIssue {
                    column: column.id.clone(),
                    message: format!("invalid {} definition: {}", type_name, reason),
                }),
                ColumnKind::Relation(cfg) if cfg.target_table_id.as_str().is_empty() => {
                    issues.push(SchemaIssue {
                        column: column.id.clone(),
                        message: "relation has no target table".to_string(),
                    })
                }
                kind => {
                    if let Some(relation_id) = kind.source_relation() {
                        if let Err(e) = source_relation(self, column, relation_id) {
                            issues.push(SchemaIssue {
                                column: column.id.clone(),
                                message: match e {
                                    EngineError::MisconfiguredColumn { reason, .. } => reason,
                                    other => other.to_string(),
                                },
                            });
                        }
                    }
                }
            }
        }

        issues
    }
}
