//! Subcommand implementations.

use relcalc_core::schema::SchemaIssue;
use relcalc_core::{
    CellDisplayValue, ColumnId, ColumnKind, EngineConfig, RelationEngine, RowId, Schema, TableId,
};
use serde::Serialize;

use crate::fixture::Fixture;

/// A schema problem with the table it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub table: TableId,
    pub issue: SchemaIssue,
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.issue)
    }
}

/// Checks every table, including references into other tables.
pub fn validate(fixture: &Fixture) -> Vec<Issue> {
    let schemas: Vec<Schema> = fixture.tables.iter().map(|t| t.schema()).collect();
    let mut issues = Vec::new();

    for schema in &schemas {
        let mut push = |column: &ColumnId, message: String| {
            issues.push(Issue {
                table: schema.table_id.clone(),
                issue: SchemaIssue {
                    column: column.clone(),
                    message,
                },
            })
        };

        for issue in schema.validate() {
            push(&issue.column, issue.message);
        }

        for column in &schema.columns {
            let (relation_id, field) = match &column.kind {
                ColumnKind::Relation(cfg) => {
                    if !schemas.iter().any(|s| s.table_id == cfg.target_table_id) {
                        push(
                            &column.id,
                            format!("target table '{}' does not exist", cfg.target_table_id),
                        );
                    }
                    continue;
                }
                ColumnKind::Lookup(cfg) => (&cfg.source_relation_column_id, Some(&cfg.target_field_id)),
                ColumnKind::Rollup(cfg) => (&cfg.source_relation_column_id, Some(&cfg.target_field_id)),
                ColumnKind::Formula(formula) => {
                    (&formula.relation_column_id, formula.target_field_id.as_ref())
                }
                _ => continue,
            };

            let (Some(relation), Some(field)) = (schema.relation(relation_id), field) else {
                continue;
            };
            let Some(target) = schemas.iter().find(|s| s.table_id == relation.target_table_id)
            else {
                continue;
            };
            match target.column(field) {
                None => push(
                    &column.id,
                    format!("field '{}' does not exist in table '{}'", field, target.table_id),
                ),
                Some(target_field)
                    if target_field.kind.is_derived()
                        && !matches!(column.kind, ColumnKind::Lookup(_)) =>
                {
                    push(
                        &column.id,
                        format!(
                            "field '{}' is a {} column; only one relation hop is supported",
                            field,
                            target_field.kind.type_name()
                        ),
                    )
                }
                Some(_) => {}
            }
        }
    }

    issues
}

/// One evaluated cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalOutput {
    pub row: RowId,
    pub value: CellDisplayValue,
    pub display: String,
}

/// Evaluates one column for the given rows (all rows of the table if empty).
pub async fn eval(
    fixture: &Fixture,
    config: EngineConfig,
    table: &TableId,
    column: &ColumnId,
    rows: &[RowId],
) -> anyhow::Result<Vec<EvalOutput>> {
    let Some(fixture_table) = fixture.table(table) else {
        anyhow::bail!("Table '{}' is not in the fixture", table);
    };
    let rows: Vec<RowId> = if rows.is_empty() {
        fixture_table.rows.iter().map(|r| r.id.clone()).collect()
    } else {
        rows.to_vec()
    };

    let display = config.display.clone();
    let engine = RelationEngine::new(fixture.to_store(), config);
    let values = engine.evaluate_column(table, &rows, column).await;
    tracing::debug!("Evaluation done: {:?}", engine.cache_stats());

    Ok(rows
        .into_iter()
        .zip(values)
        .map(|(row, value)| EvalOutput {
            row,
            display: value.display(&display),
            value,
        })
        .collect())
}
