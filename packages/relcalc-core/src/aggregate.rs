//! Aggregation over linked rows.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{DisplayOptions, NumberLocale};
use crate::display::{display_value, format_number};
use crate::error::AggregationError;
use crate::row::Row;
use crate::schema::{Column, ColumnKind};

/// Separator used by `concat` when none is configured.
pub const DEFAULT_SEPARATOR: &str = ", ";

/// Aggregate functions available to rollup and formula columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// Number of linked rows
    Count,
    /// Number of distinct non-empty values
    #[serde(alias = "unique")]
    CountUnique,
    /// Sum of numeric values
    Sum,
    /// Mean of numeric values
    #[serde(alias = "average")]
    Avg,
    /// Smallest numeric value
    Min,
    /// Largest numeric value
    Max,
    /// Median of numeric values
    Median,
    /// Non-empty display values joined by a separator
    Concat,
    /// Rows whose value is empty
    #[serde(alias = "empty")]
    CountEmpty,
    /// Rows whose value is not empty
    #[serde(alias = "not_empty")]
    CountNotEmpty,
}

impl AggregateFunction {
    /// All functions in declaration order.
    pub const ALL: [AggregateFunction; 10] = [
        AggregateFunction::Count,
        AggregateFunction::CountUnique,
        AggregateFunction::Sum,
        AggregateFunction::Avg,
        AggregateFunction::Min,
        AggregateFunction::Max,
        AggregateFunction::Median,
        AggregateFunction::Concat,
        AggregateFunction::CountEmpty,
        AggregateFunction::CountNotEmpty,
    ];

    /// Canonical snake_case name.
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::CountUnique => "count_unique",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Median => "median",
            AggregateFunction::Concat => "concat",
            AggregateFunction::CountEmpty => "count_empty",
            AggregateFunction::CountNotEmpty => "count_not_empty",
        }
    }

    /// Parses a function name (case-insensitive, accepts legacy aliases).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        let canonical = match name.as_str() {
            "unique" => "count_unique",
            "average" => "avg",
            "empty" => "count_empty",
            "not_empty" => "count_not_empty",
            other => other,
        };
        Self::ALL.into_iter().find(|f| f.name() == canonical)
    }

    /// Functions that only consider numeric values.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AggregateFunction::Sum
                | AggregateFunction::Avg
                | AggregateFunction::Min
                | AggregateFunction::Max
                | AggregateFunction::Median
        )
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of an aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// Row counts
    Count(u64),
    /// Numeric aggregates
    Number(f64),
    /// Concatenations and lookup labels
    Text(String),
}

impl ScalarValue {
    /// Display form: counts as integers, numbers with two decimals.
    pub fn display(&self, locale: &NumberLocale) -> String {
        match self {
            ScalarValue::Count(n) => n.to_string(),
            ScalarValue::Number(n) => format_number(*n, Some(2), locale),
            ScalarValue::Text(s) => s.clone(),
        }
    }

    /// Numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Count(n) => Some(*n as f64),
            ScalarValue::Number(n) => Some(*n),
            ScalarValue::Text(_) => None,
        }
    }
}

/// Coerces a raw value to a number, if possible.
///
/// Numbers pass through; strings are parsed after trimming (percent columns
/// may carry a trailing `%`). Everything else is not numeric.
pub fn numeric_value(value: &serde_json::Value, kind: &ColumnKind) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let mut text = s.trim();
            if matches!(kind, ColumnKind::Percent) {
                text = text.strip_suffix('%').unwrap_or(text).trim_end();
            }
            text.parse::<f64>().ok()
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// Returns true for null, empty strings, and empty arrays or objects.
pub fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Reduces `rows` to a scalar over `field`.
///
/// Returns `Ok(None)` when the function has no defined result (the mean,
/// extremes, or median of zero numeric values; a concat of nothing).
/// Numeric functions on a field whose type cannot hold numbers fail with
/// [`AggregationError::TypeMismatch`]; individual non-numeric values are
/// skipped.
pub fn aggregate(
    rows: &[Row],
    field: &Column,
    function: AggregateFunction,
    separator: Option<&str>,
    display: &DisplayOptions,
) -> Result<Option<ScalarValue>, AggregationError> {
    if function.is_numeric() && !field.kind.is_numeric_capable() {
        return Err(AggregationError::TypeMismatch {
            function,
            column_type: field.kind.type_name(),
        });
    }

    let values = || rows.iter().map(|row| row.get(&field.id));
    let numbers = || values().filter_map(|v| numeric_value(v, &field.kind));

    let result = match function {
        AggregateFunction::Count => Some(ScalarValue::Count(rows.len() as u64)),
        AggregateFunction::CountEmpty => {
            Some(ScalarValue::Count(values().filter(|v| is_empty_value(v)).count() as u64))
        }
        AggregateFunction::CountNotEmpty => {
            Some(ScalarValue::Count(values().filter(|v| !is_empty_value(v)).count() as u64))
        }
        AggregateFunction::CountUnique => {
            let distinct: HashSet<String> = values()
                .filter(|v| !is_empty_value(v))
                .map(|v| v.to_string())
                .collect();
            Some(ScalarValue::Count(distinct.len() as u64))
        }
        AggregateFunction::Sum => {
            Some(ScalarValue::Number(numbers().fold(0.0, |acc, n| acc + n)))
        }
        AggregateFunction::Avg => {
            let (sum, count) = numbers().fold((0.0, 0usize), |(s, c), n| (s + n, c + 1));
            (count > 0).then(|| ScalarValue::Number(sum / count as f64))
        }
        AggregateFunction::Min => numbers().reduce(f64::min).map(ScalarValue::Number),
        AggregateFunction::Max => numbers().reduce(f64::max).map(ScalarValue::Number),
        AggregateFunction::Median => {
            let mut sorted: Vec<f64> = numbers().collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let len = sorted.len();
            match len {
                0 => None,
                _ if len % 2 == 0 => Some(ScalarValue::Number(
                    (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0,
                )),
                _ => Some(ScalarValue::Number(sorted[len / 2])),
            }
        }
        AggregateFunction::Concat => {
            let parts: Vec<String> = values()
                .filter(|v| !is_empty_value(v))
                .map(|v| display_value(v, &field.kind, display))
                .filter(|s| !s.is_empty())
                .collect();
            (!parts.is_empty())
                .then(|| ScalarValue::Text(parts.join(separator.unwrap_or(DEFAULT_SEPARATOR))))
        }
    };

    Ok(result)
}
