//! Tick-based invalidation runtime.
//!
//! Drains change notifications from the store, coalesces them per tick,
//! and drives the engine's cache invalidation.

mod batch;
mod config;
mod runtime;

pub use batch::{ChangeBatch, Invalidation};
pub use config::RuntimeConfig;
pub use runtime::{InvalidationRuntime, RuntimeStats};
