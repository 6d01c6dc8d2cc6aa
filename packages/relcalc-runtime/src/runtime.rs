//! Invalidation loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use relcalc_core::{ChangeEvent, RelationEngine};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::batch::{ChangeBatch, Invalidation};
use crate::config::RuntimeConfig;

/// Counters accumulated over the runtime's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Ticks executed
    pub ticks: u64,
    /// Change events consumed
    pub events_applied: u64,
    /// Row invalidations issued
    pub rows_invalidated: u64,
    /// Table invalidations issued
    pub tables_invalidated: u64,
    /// Cache entries removed by pruning
    pub pruned: u64,
}

/// Applies store change notifications to a [`RelationEngine`] on a fixed tick.
pub struct InvalidationRuntime {
    /// Engine whose cache is maintained
    engine: RelationEngine,
    /// Configuration
    config: RuntimeConfig,
    /// Change event receiver
    rx: mpsc::Receiver<ChangeEvent>,
    /// Set by the broadcast forwarder when events were dropped
    lagged: Arc<AtomicBool>,
    /// Broadcast forwarder task, if any
    forwarder: Option<JoinHandle<()>>,
    /// Set once the channel is closed and drained
    closed: bool,
    stats: RuntimeStats,
}

impl InvalidationRuntime {
    /// Creates a runtime reading from an mpsc channel.
    pub fn new(
        engine: RelationEngine,
        config: RuntimeConfig,
        rx: mpsc::Receiver<ChangeEvent>,
    ) -> Self {
        Self {
            engine,
            config,
            rx,
            lagged: Arc::new(AtomicBool::new(false)),
            forwarder: None,
            closed: false,
            stats: RuntimeStats::default(),
        }
    }

    /// Creates a runtime reading from a broadcast channel.
    ///
    /// Events are forwarded by a spawned task. If the receiver lags, the
    /// next tick clears the whole cache since the dropped events are unknown.
    pub fn from_broadcast(
        engine: RelationEngine,
        config: RuntimeConfig,
        mut events: broadcast::Receiver<ChangeEvent>,
    ) -> Self {
        let capacity = config.max_events_per_tick.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let mut runtime = Self::new(engine, config, rx);
        let lagged = runtime.lagged.clone();

        runtime.forwarder = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Change stream lagged, {} events were dropped", skipped);
                        lagged.store(true, Ordering::Release);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Change stream closed");
        }));
        runtime
    }

    /// Counters so far.
    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    /// Returns true once the channel is closed and every event was applied.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drains and applies pending events, pruning the cache when due.
    ///
    /// Returns the number of events consumed.
    pub fn tick(&mut self) -> usize {
        if self.lagged.swap(false, Ordering::AcqRel) {
            tracing::warn!("Clearing derived cache after lost change events");
            self.engine.cache().clear();
        }

        let mut batch = ChangeBatch::new();
        while batch.event_count() < self.config.max_events_per_tick {
            match self.rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }

        let consumed = batch.event_count();
        if !batch.is_empty() {
            self.apply(batch);
        }

        self.stats.ticks += 1;
        let interval = self.config.prune_interval_ticks;
        if interval > 0 && self.stats.ticks % interval == 0 {
            let pruned = self.engine.prune_expired();
            if pruned > 0 {
                tracing::debug!("Pruned {} expired cache entries", pruned);
            }
            self.stats.pruned += pruned as u64;
        }
        consumed
    }

    /// Runs until the event channel is closed and drained.
    pub async fn run(mut self) -> anyhow::Result<RuntimeStats> {
        tracing::info!(
            "Invalidation runtime started (tick {:?})",
            self.config.tick_interval
        );
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.closed {
            ticker.tick().await;
            self.tick();
        }

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.await.context("Change stream forwarder failed")?;
        }
        tracing::info!("Invalidation runtime stopped: {:?}", self.stats);
        Ok(self.stats)
    }

    fn apply(&mut self, batch: ChangeBatch) {
        let events = batch.event_count();
        let invalidations = batch.into_invalidations(self.config.bulk_threshold);
        tracing::debug!(
            "Applying {} events as {} invalidations",
            events,
            invalidations.len()
        );

        for invalidation in invalidations {
            match invalidation {
                Invalidation::Row(table, row) => {
                    self.engine.invalidate_row(&table, &row);
                    self.stats.rows_invalidated += 1;
                }
                Invalidation::Table(table) => {
                    self.engine.invalidate_table(&table);
                    self.stats.tables_invalidated += 1;
                }
            }
        }
        self.stats.events_applied += events as u64;
    }
}
