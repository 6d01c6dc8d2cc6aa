//! Integration tests for the relation engine.
//!
//! Organized by area:
//! 1. Lookup, rollup and formula evaluation
//! 2. Request batching and de-duplication
//! 3. Cache invalidation
//! 4. Store failures, timeouts and render passes

pub mod evaluation_tests;
pub mod failure_tests;
pub mod helpers;
pub mod invalidation_tests;
