//! Lookup, rollup, and formula cell evaluation.
//!
//! Each cell read goes `Uncomputed -> Resolving -> Resolved | Failed`.
//! Errors never escape: a failed cell renders as an error value and is
//! cached briefly (transient failures) or for the normal TTL (structural
//! ones), so the next read after expiry starts over.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

use crate::aggregate::{aggregate, AggregateFunction, ScalarValue};
use crate::cache::{CacheStats, CellKey, Dependency, DerivedCache, EpochSnapshot};
use crate::config::{DisplayOptions, EngineConfig};
use crate::display::get_display_value;
use crate::error::{EngineError, Result};
use crate::loader::BatchLoader;
use crate::resolver::RelationResolver;
use crate::row::{ColumnId, Row, RowId, TableId};
use crate::schema::validation::source_relation;
use crate::schema::{parse_links, Column, ColumnKind, RelationConfig, Schema};
use crate::store::{ChangeEvent, ChangeKind, RowStore};

/// Value handed to cell renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellDisplayValue {
    /// A single value
    Scalar { value: ScalarValue },
    /// One value per linked row (multi-valued lookups)
    List { values: Vec<String> },
    /// Evaluation failed; `message` is short and user-facing
    Error { message: String },
    /// Nothing to show
    Empty,
}

impl CellDisplayValue {
    fn text(value: String) -> Self {
        if value.is_empty() {
            CellDisplayValue::Empty
        } else {
            CellDisplayValue::Scalar {
                value: ScalarValue::Text(value),
            }
        }
    }

    /// Plain-text rendering; errors render as the placeholder.
    pub fn display(&self, options: &DisplayOptions) -> String {
        match self {
            CellDisplayValue::Scalar { value } => value.display(&options.locale),
            CellDisplayValue::List { values } => values.join(", "),
            CellDisplayValue::Error { .. } => options.derived_placeholder.clone(),
            CellDisplayValue::Empty => String::new(),
        }
    }

    /// Returns true for error values.
    pub fn is_error(&self) -> bool {
        matches!(self, CellDisplayValue::Error { .. })
    }
}

/// Evaluation state of a cell, reported in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Uncomputed,
    Resolving,
    Resolved,
    Failed,
}

/// A cell to evaluate.
pub type CellRequest = CellKey;

/// Token for one render pass.
///
/// Results computed for a closed pass are neither cached nor returned.
#[derive(Debug, Clone)]
pub struct RenderPass {
    id: u64,
    active: Arc<AtomicBool>,
}

impl RenderPass {
    /// Pass identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true until the pass is closed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Tears the pass down (view closed, row scrolled away).
    pub fn close(&self) {
        self.active.store(false, Ordering::Release);
    }
}

struct Computed {
    value: CellDisplayValue,
    dependency: Option<Dependency>,
    cacheable: bool,
}

impl Computed {
    fn derived(value: CellDisplayValue, dependency: Option<Dependency>) -> Self {
        Self {
            value,
            dependency,
            cacheable: true,
        }
    }
}

/// Target side of a relation after the source row was read.
struct Links<'a> {
    relation: &'a RelationConfig,
    ids: Vec<RowId>,
    target: Arc<Schema>,
}

impl Links<'_> {
    fn dependency(&self) -> Dependency {
        Dependency {
            table: self.target.table_id.clone(),
            rows: self.ids.iter().cloned().collect(),
        }
    }
}

type InflightSlot = Arc<OnceCell<CellDisplayValue>>;

struct EngineInner {
    config: EngineConfig,
    loader: BatchLoader,
    resolver: RelationResolver,
    cache: DerivedCache,
    inflight: Mutex<HashMap<CellKey, InflightSlot>>,
    next_pass: AtomicU64,
}

/// Evaluates derived cells against a [`RowStore`].
///
/// Cloning is cheap; clones share the cache and the loader.
#[derive(Clone)]
pub struct RelationEngine {
    inner: Arc<EngineInner>,
}

impl RelationEngine {
    /// Creates an engine with a fresh cache.
    pub fn new(store: Arc<dyn RowStore>, config: EngineConfig) -> Self {
        let loader = BatchLoader::new(store, config.batch_window, config.store_timeout);
        let resolver = RelationResolver::new(loader.clone(), config.display.clone());
        let cache = DerivedCache::new(config.entry_ttl);
        Self {
            inner: Arc::new(EngineInner {
                config,
                loader,
                resolver,
                cache,
                inflight: Mutex::new(HashMap::new()),
                next_pass: AtomicU64::new(1),
            }),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The relation resolver used by this engine.
    pub fn resolver(&self) -> &RelationResolver {
        &self.inner.resolver
    }

    /// The derived-cell cache.
    pub fn cache(&self) -> &DerivedCache {
        &self.inner.cache
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Number of batched row fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.inner.loader.flush_count()
    }

    /// Starts a render pass.
    pub fn begin_pass(&self) -> RenderPass {
        RenderPass {
            id: self.inner.next_pass.fetch_add(1, Ordering::Relaxed),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Evaluates one cell. Never fails; errors become [`CellDisplayValue::Error`].
    pub async fn evaluate_cell(
        &self,
        table: &TableId,
        row: &RowId,
        column: &ColumnId,
    ) -> CellDisplayValue {
        let key = CellKey::new(table.clone(), row.clone(), column.clone());
        self.evaluate(key, None).await
    }

    /// Evaluates one cell for a render pass. Returns `None` if the pass was
    /// closed before the value was ready.
    pub async fn evaluate_cell_in(
        &self,
        pass: &RenderPass,
        table: &TableId,
        row: &RowId,
        column: &ColumnId,
    ) -> Option<CellDisplayValue> {
        if !pass.is_active() {
            return None;
        }
        let key = CellKey::new(table.clone(), row.clone(), column.clone());
        let value = self.evaluate(key, Some(pass)).await;
        pass.is_active().then_some(value)
    }

    /// Evaluates many cells concurrently so that row fetches are coalesced.
    /// Results are returned in request order.
    pub async fn evaluate_cells(&self, requests: Vec<CellRequest>) -> Vec<CellDisplayValue> {
        let mut results = vec![
            CellDisplayValue::Error {
                message: "Evaluation was aborted".to_string(),
            };
            requests.len()
        ];

        let mut tasks = JoinSet::new();
        for (index, key) in requests.into_iter().enumerate() {
            let engine = self.clone();
            tasks.spawn(async move { (index, engine.evaluate(key, None).await) });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, value)) => results[index] = value,
                Err(e) => tracing::error!("Cell evaluation task failed: {}", e),
            }
        }
        results
    }

    /// Evaluates one column for many rows.
    pub async fn evaluate_column(
        &self,
        table: &TableId,
        rows: &[RowId],
        column: &ColumnId,
    ) -> Vec<CellDisplayValue> {
        let requests = rows
            .iter()
            .map(|row| CellKey::new(table.clone(), row.clone(), column.clone()))
            .collect();
        self.evaluate_cells(requests).await
    }

    /// A row's own data changed.
    pub fn invalidate_row(&self, table: &TableId, row: &RowId) {
        let dropped = self.inner.cache.invalidate(table, row);
        tracing::debug!("Invalidated row {}/{} ({} entries)", table, row, dropped);
    }

    /// Many rows of a table changed (import, clear, delete).
    pub fn invalidate_table(&self, table: &TableId) {
        let dropped = self.inner.cache.invalidate_targets(table);
        tracing::debug!("Invalidated table {} ({} entries)", table, dropped);
    }

    /// A column was reconfigured.
    pub fn invalidate_column(&self, table: &TableId, column: &ColumnId) {
        let dropped = self.inner.cache.invalidate_column(table, column);
        tracing::debug!("Invalidated column {}/{} ({} entries)", table, column, dropped);
    }

    /// Applies a change notification.
    pub fn apply_change(&self, event: &ChangeEvent) {
        match (event.kind, &event.row_id) {
            (ChangeKind::Insert | ChangeKind::Update | ChangeKind::Delete, Some(row)) => {
                self.invalidate_row(&event.table, row)
            }
            _ => self.invalidate_table(&event.table),
        }
    }

    /// Removes expired cache entries.
    pub fn prune_expired(&self) -> usize {
        self.inner.cache.prune_expired()
    }

    async fn evaluate(&self, key: CellKey, pass: Option<&RenderPass>) -> CellDisplayValue {
        if let Some(entry) = self.inner.cache.get(&key) {
            tracing::trace!("{:?} served from cache (v{})", key, entry.version);
            return entry.value;
        }

        let slot = {
            let mut inflight = self.inner.inflight.lock();
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let value = slot
            .get_or_init(|| self.compute(&key, pass))
            .await
            .clone();

        let mut inflight = self.inner.inflight.lock();
        if inflight.get(&key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
            inflight.remove(&key);
        }
        value
    }

    async fn compute(&self, key: &CellKey, pass: Option<&RenderPass>) -> CellDisplayValue {
        tracing::debug!("{:?}: {:?} -> {:?}", key, CellState::Uncomputed, CellState::Resolving);
        let mut observed = EpochSnapshot::default();
        let mut reads = None;
        self.inner.cache.observe(&mut observed, &key.table);

        let (computed, ttl) = match self.compute_value(key, &mut observed, &mut reads).await {
            Ok(computed) => {
                tracing::debug!("{:?}: -> {:?}", key, CellState::Resolved);
                (computed, self.inner.config.entry_ttl)
            }
            Err(e) => {
                tracing::debug!("{:?}: -> {:?} ({})", key, CellState::Failed, e);
                let ttl = if e.is_transient() {
                    self.inner.config.error_ttl
                } else {
                    tracing::warn!("Cell {:?} cannot be computed: {}", key, e);
                    self.inner.config.entry_ttl
                };
                let value = CellDisplayValue::Error {
                    message: e.user_message(),
                };
                // Kept so a change to the target table clears the error
                (Computed::derived(value, reads), ttl)
            }
        };

        let still_wanted = pass.map_or(true, RenderPass::is_active);
        if computed.cacheable && still_wanted {
            self.inner.cache.put(
                key.clone(),
                computed.value.clone(),
                computed.dependency,
                ttl,
                &observed,
            );
        }
        computed.value
    }

    /// `reads` is set to the linked target rows once the source row was read.
    async fn compute_value(
        &self,
        key: &CellKey,
        observed: &mut EpochSnapshot,
        reads: &mut Option<Dependency>,
    ) -> Result<Computed> {
        let schema = self.schema(&key.table, observed).await?;
        let column = schema.column(&key.column).ok_or_else(|| {
            EngineError::misconfigured(key.column.as_str(), "column does not exist")
        })?;

        match &column.kind {
            ColumnKind::Invalid { reason, .. } => {
                Err(EngineError::misconfigured(column.id.as_str(), reason.clone()))
            }
            ColumnKind::Relation(relation) => {
                let Some(links) = self
                    .links(key, &column.id, relation, observed, reads)
                    .await?
                else {
                    return Ok(Computed::derived(CellDisplayValue::Empty, None));
                };
                self.relation_cell(&links).await
            }
            ColumnKind::Lookup(cfg) => {
                let relation = source_relation(&schema, column, &cfg.source_relation_column_id)?;
                let Some(links) = self
                    .links(key, &cfg.source_relation_column_id, relation, observed, reads)
                    .await?
                else {
                    return Ok(Computed::derived(CellDisplayValue::Empty, None));
                };
                self.lookup_cell(column, &links, &cfg.target_field_id).await
            }
            ColumnKind::Rollup(cfg) => {
                let relation = source_relation(&schema, column, &cfg.source_relation_column_id)?;
                let Some(links) = self
                    .links(key, &cfg.source_relation_column_id, relation, observed, reads)
                    .await?
                else {
                    return Ok(Computed::derived(CellDisplayValue::Empty, None));
                };
                self.rollup_cell(
                    column,
                    &links,
                    Some(&cfg.target_field_id),
                    cfg.function,
                    cfg.separator.as_deref(),
                )
                .await
            }
            ColumnKind::Formula(formula) => {
                let relation = source_relation(&schema, column, &formula.relation_column_id)?;
                let Some(links) = self
                    .links(key, &formula.relation_column_id, relation, observed, reads)
                    .await?
                else {
                    return Ok(Computed::derived(CellDisplayValue::Empty, None));
                };
                self.rollup_cell(
                    column,
                    &links,
                    formula.target_field_id.as_ref(),
                    formula.function,
                    formula.separator.as_deref(),
                )
                .await
            }
            _ => {
                let row = self.inner.loader.load_one(&key.table, &key.row).await?;
                let value = row
                    .map(|row| get_display_value(&row, column, &self.inner.config.display))
                    .unwrap_or_default();
                Ok(Computed {
                    value: CellDisplayValue::text(value),
                    dependency: None,
                    cacheable: false,
                })
            }
        }
    }

    /// Schema from the cache, or loaded (and cached) through the loader.
    async fn schema(&self, table: &TableId, observed: &mut EpochSnapshot) -> Result<Arc<Schema>> {
        self.inner.cache.observe(observed, table);
        if let Some(schema) = self.inner.cache.get_schema(table) {
            return Ok(schema);
        }
        let schema = self.inner.loader.load_schema(table).await?;
        self.inner.cache.put_schema(schema.clone(), observed);
        Ok(schema)
    }

    /// Reads the source row's relation value. `None` if the source row is gone.
    async fn links<'a>(
        &self,
        key: &CellKey,
        relation_column: &ColumnId,
        relation: &'a RelationConfig,
        observed: &mut EpochSnapshot,
        reads: &mut Option<Dependency>,
    ) -> Result<Option<Links<'a>>> {
        let Some(row) = self.inner.loader.load_one(&key.table, &key.row).await? else {
            return Ok(None);
        };
        let ids = parse_links(row.get(relation_column), relation.cardinality);
        *reads = Some(Dependency {
            table: relation.target_table_id.clone(),
            rows: ids.iter().cloned().collect(),
        });
        let target = self.schema(&relation.target_table_id, observed).await?;
        Ok(Some(Links {
            relation,
            ids,
            target,
        }))
    }

    async fn target_rows(&self, links: &Links<'_>) -> Result<Vec<Row>> {
        if links.ids.is_empty() {
            return Ok(Vec::new());
        }
        self.inner
            .resolver
            .fetch_ordered(&links.target.table_id, &links.ids)
            .await
    }

    async fn relation_cell(&self, links: &Links<'_>) -> Result<Computed> {
        let resolved = self
            .inner
            .resolver
            .resolve_many(
                &links.target,
                &links.ids,
                links.relation.display_field_id.as_ref(),
            )
            .await?;

        let value = if links.relation.cardinality.is_multi() {
            if resolved.is_empty() {
                CellDisplayValue::Empty
            } else {
                CellDisplayValue::List {
                    values: resolved.into_iter().map(|r| r.display_value).collect(),
                }
            }
        } else {
            match resolved.into_iter().next() {
                Some(r) => CellDisplayValue::text(r.display_value),
                None => CellDisplayValue::Empty,
            }
        };
        Ok(Computed::derived(value, Some(links.dependency())))
    }

    async fn lookup_cell(
        &self,
        column: &Column,
        links: &Links<'_>,
        target_field: &ColumnId,
    ) -> Result<Computed> {
        let field = links.target.column(target_field).ok_or_else(|| {
            EngineError::misconfigured(
                column.id.as_str(),
                format!(
                    "field '{}' does not exist in table '{}'",
                    target_field, links.target.table_id
                ),
            )
        })?;

        let rows = self.target_rows(links).await?;
        let display = &self.inner.config.display;
        let mut values = rows.iter().map(|row| get_display_value(row, field, display));

        let value = if links.relation.cardinality.is_multi() {
            let values: Vec<String> = values.collect();
            if values.is_empty() {
                CellDisplayValue::Empty
            } else {
                CellDisplayValue::List { values }
            }
        } else {
            values
                .next()
                .map(CellDisplayValue::text)
                .unwrap_or(CellDisplayValue::Empty)
        };
        Ok(Computed::derived(value, Some(links.dependency())))
    }

    async fn rollup_cell(
        &self,
        column: &Column,
        links: &Links<'_>,
        target_field: Option<&ColumnId>,
        function: AggregateFunction,
        separator: Option<&str>,
    ) -> Result<Computed> {
        let field = match target_field {
            Some(id) => {
                let field = links.target.column(id).ok_or_else(|| {
                    EngineError::misconfigured(
                        column.id.as_str(),
                        format!(
                            "field '{}' does not exist in table '{}'; only one relation hop is supported",
                            id, links.target.table_id
                        ),
                    )
                })?;
                if field.kind.is_derived() {
                    return Err(EngineError::misconfigured(
                        column.id.as_str(),
                        format!(
                            "field '{}' is a {} column; only one relation hop is supported",
                            id,
                            field.kind.type_name()
                        ),
                    ));
                }
                Some(field)
            }
            None => None,
        };

        let rows = self.target_rows(links).await?;
        let value = match field {
            Some(field) => aggregate(&rows, field, function, separator, &self.inner.config.display)?,
            None => Some(ScalarValue::Count(rows.len() as u64)),
        };

        let value = match value {
            Some(value) => CellDisplayValue::Scalar { value },
            None => CellDisplayValue::Empty,
        };
        Ok(Computed::derived(value, Some(links.dependency())))
    }
}
