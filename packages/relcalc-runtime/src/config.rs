//! Runtime configuration.

use std::time::Duration;

/// Invalidation runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Time between ticks
    pub tick_interval: Duration,
    /// Events drained per tick; the rest wait for the next tick
    pub max_events_per_tick: usize,
    /// Row events for one table in one tick above which the whole table is invalidated
    pub bulk_threshold: usize,
    /// Prune expired cache entries every N ticks (0 = never)
    pub prune_interval_ticks: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            max_events_per_tick: 1024,
            bulk_threshold: 64,
            prune_interval_ticks: 200,
        }
    }
}
