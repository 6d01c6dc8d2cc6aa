//! Request coalescing in front of the row store.
//!
//! All row requests for one table that arrive within the batch window are
//! merged into a single `get_rows` call. The first request of a window
//! spawns the flush task; later requests add their ids and wait for the
//! shared result. Because the flush runs in its own task, a requester that
//! goes away never strands the others.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, OnceCell};

use crate::error::{EngineError, Result};
use crate::row::{Row, RowId, TableId};
use crate::schema::Schema;
use crate::store::RowStore;

/// Rows returned by one batched fetch, shared by every requester.
pub type RowBatch = Arc<HashMap<RowId, Row>>;

type SchemaSlot = Arc<OnceCell<Result<Arc<Schema>>>>;

struct PendingBatch {
    ids: BTreeSet<RowId>,
    waiters: Vec<oneshot::Sender<Result<RowBatch>>>,
}

struct LoaderInner {
    store: Arc<dyn RowStore>,
    batch_window: Duration,
    timeout: Duration,
    pending: Mutex<HashMap<TableId, PendingBatch>>,
    schemas: Mutex<HashMap<TableId, SchemaSlot>>,
    flushes: AtomicU64,
}

/// Batching, de-duplicating loader over a [`RowStore`].
#[derive(Clone)]
pub struct BatchLoader {
    inner: Arc<LoaderInner>,
}

impl BatchLoader {
    /// Creates a loader.
    ///
    /// # Arguments
    /// * `store` - Backing row store
    /// * `batch_window` - How long a batch stays open (zero = one scheduler yield)
    /// * `timeout` - Upper bound for each store call
    pub fn new(store: Arc<dyn RowStore>, batch_window: Duration, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                store,
                batch_window,
                timeout,
                pending: Mutex::new(HashMap::new()),
                schemas: Mutex::new(HashMap::new()),
                flushes: AtomicU64::new(0),
            }),
        }
    }

    /// Number of `get_rows` calls issued so far.
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::Relaxed)
    }

    /// Loads rows of `table`, merged with concurrent requests for the same table.
    ///
    /// The returned batch may contain rows requested by others; ids with no
    /// row are simply absent.
    pub async fn load(&self, table: &TableId, ids: &BTreeSet<RowId>) -> Result<RowBatch> {
        if ids.is_empty() {
            return Ok(Arc::new(HashMap::new()));
        }

        let (tx, rx) = oneshot::channel();
        let leader = {
            let mut pending = self.inner.pending.lock();
            match pending.get_mut(table) {
                Some(batch) => {
                    batch.ids.extend(ids.iter().cloned());
                    batch.waiters.push(tx);
                    false
                }
                None => {
                    pending.insert(
                        table.clone(),
                        PendingBatch {
                            ids: ids.clone(),
                            waiters: vec![tx],
                        },
                    );
                    true
                }
            }
        };

        if leader {
            self.spawn_flush(table.clone());
        } else {
            tracing::trace!("Joined pending batch for table {}", table);
        }

        rx.await
            .map_err(|_| EngineError::StoreUnavailable("batch fetch was dropped".to_string()))?
    }

    /// Loads a single row.
    pub async fn load_one(&self, table: &TableId, id: &RowId) -> Result<Option<Row>> {
        let ids = BTreeSet::from([id.clone()]);
        let batch = self.load(table, &ids).await?;
        Ok(batch.get(id).cloned())
    }

    fn spawn_flush(&self, table: TableId) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if inner.batch_window.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(inner.batch_window).await;
            }

            let batch = inner.pending.lock().remove(&table);
            let Some(batch) = batch else {
                return;
            };
            inner.flushes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Fetching {} rows of table {} for {} requests",
                batch.ids.len(),
                table,
                batch.waiters.len()
            );

            let result =
                match tokio::time::timeout(inner.timeout, inner.store.get_rows(&table, &batch.ids))
                    .await
                {
                    Ok(Ok(rows)) => Ok(Arc::new(rows)),
                    Ok(Err(e)) => {
                        tracing::error!("Row fetch for table {} failed: {}", table, e);
                        Err(EngineError::from(e))
                    }
                    Err(_) => {
                        tracing::error!("Row fetch for table {} timed out", table);
                        Err(EngineError::Timeout)
                    }
                };

            for waiter in batch.waiters {
                // The requester may have gone away; its result is simply dropped.
                let _ = waiter.send(result.clone());
            }
        });
    }

    /// Loads a table schema. Concurrent loads of the same table share one request.
    pub async fn load_schema(&self, table: &TableId) -> Result<Arc<Schema>> {
        let slot = {
            let mut schemas = self.inner.schemas.lock();
            schemas
                .entry(table.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = slot
            .get_or_init(|| async {
                match tokio::time::timeout(self.inner.timeout, self.inner.store.get_schema(table))
                    .await
                {
                    Ok(Ok(schema)) => Ok(Arc::new(schema)),
                    Ok(Err(e)) => Err(EngineError::from(e)),
                    Err(_) => Err(EngineError::Timeout),
                }
            })
            .await
            .clone();

        let mut schemas = self.inner.schemas.lock();
        if schemas.get(table).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
            schemas.remove(table);
        }
        result
    }
}
