//! Tracing, logging, metrics (shared setup).

/// Initialize process-wide observability (JSON tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Stats backends (counters and timings with tags).
pub mod metrics;

pub use metrics::{InMemoryStats, NoopStats, Observation, StatsBackend, Tags, TracingStats};
