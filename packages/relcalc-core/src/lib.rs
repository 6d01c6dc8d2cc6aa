//! Cross-table relational computation engine.
//!
//! Provides relation resolution, lookup and rollup evaluation,
//! batched row loading, and a derived-cell cache with event-driven
//! invalidation.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod display;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod resolver;
pub mod row;
pub mod schema;
pub mod store;

pub use aggregate::{aggregate, AggregateFunction, ScalarValue};
pub use cache::{CacheStats, CellKey, DerivedCache};
pub use config::{DisplayOptions, EngineConfig, NumberLocale};
pub use error::{AggregationError, ConfigError, EngineError, StoreError};
pub use evaluator::{CellDisplayValue, CellRequest, RelationEngine, RenderPass};
pub use loader::BatchLoader;
pub use resolver::{RelationResolver, ResolvedRow};
pub use row::{ColumnId, Row, RowId, TableId};
pub use schema::{Cardinality, Column, ColumnKind, RawColumn, Schema};
pub use store::{ChangeEvent, ChangeKind, MemoryStore, RowStore};
