//! Engine error types.

use thiserror::Error;

use crate::aggregate::AggregateFunction;
use crate::schema::formula::FormulaError;

/// Errors returned by a [`RowStore`](crate::store::RowStore).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Transport or backend failure
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Table does not exist (or was deleted)
    #[error("Table '{table}' not found")]
    TableNotFound { table: String },
}

/// Aggregation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// Function cannot be applied to the field's column type
    #[error("Cannot apply {function} to a {column_type} field")]
    TypeMismatch {
        function: AggregateFunction,
        column_type: &'static str,
    },
}

/// Errors raised while decoding a column definition loaded from storage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Column type name is not recognised
    #[error("Unknown column type '{0}'")]
    UnknownType(String),

    /// Config object does not match the column type
    #[error("Invalid config for {type_name} column: {reason}")]
    InvalidConfig {
        type_name: String,
        reason: String,
    },

    /// Formula expression failed to parse
    #[error("Invalid formula: {0}")]
    Formula(#[from] FormulaError),
}

/// Errors raised while evaluating a derived cell.
///
/// These never escape [`RelationEngine::evaluate_cell`](crate::RelationEngine::evaluate_cell);
/// they are turned into an error display value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Backend failure, retryable
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Store did not answer within the configured timeout
    #[error("Store request timed out")]
    Timeout,

    /// Source or target table is gone
    #[error("Table '{table}' not found")]
    TableNotFound { table: String },

    /// Column config does not describe a computable cell
    #[error("Column '{column}' is misconfigured: {reason}")]
    MisconfiguredColumn { column: String, reason: String },

    /// Aggregation failed on the target field
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl EngineError {
    /// Creates a misconfigured-column error.
    pub fn misconfigured(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MisconfiguredColumn {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if a retry may produce a different outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable(_) | EngineError::Timeout | EngineError::TableNotFound { .. }
        )
    }

    /// Short user-facing message for error cells.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::StoreUnavailable(_) | EngineError::Timeout => {
                "Linked data is temporarily unavailable".to_string()
            }
            EngineError::TableNotFound { .. } => "Linked table was deleted".to_string(),
            EngineError::MisconfiguredColumn { .. } => "Column is misconfigured".to_string(),
            EngineError::Aggregation(AggregationError::TypeMismatch { function, column_type }) => {
                format!("Cannot {} {} values", function.name(), column_type)
            }
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::TableNotFound { table } => EngineError::TableNotFound { table },
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
