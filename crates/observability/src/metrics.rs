//! Stats backends.
//!
//! A backend accepts named counter increments and timing observations, each
//! with a tag map. The exporter wire format is not modelled here; production
//! wiring plugs an exporter in behind [`StatsBackend`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// Tag map attached to every observation (ordered for stable output).
pub type Tags = BTreeMap<String, String>;

/// Sink for counters and timings.
///
/// Implementations must be safe under concurrent use: every in-flight message
/// reports through the same backend.
pub trait StatsBackend: Send + Sync {
    fn increment(&self, name: &str, value: u64, tags: &Tags);

    fn timing(&self, name: &str, elapsed: Duration, tags: &Tags);
}

impl<B> StatsBackend for Arc<B>
where
    B: StatsBackend + ?Sized,
{
    fn increment(&self, name: &str, value: u64, tags: &Tags) {
        (**self).increment(name, value, tags)
    }

    fn timing(&self, name: &str, elapsed: Duration, tags: &Tags) {
        (**self).timing(name, elapsed, tags)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStats;

impl StatsBackend for NoopStats {
    fn increment(&self, _name: &str, _value: u64, _tags: &Tags) {}

    fn timing(&self, _name: &str, _elapsed: Duration, _tags: &Tags) {}
}

/// Emits one `tracing` event per observation (target `courier::stats`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStats;

impl StatsBackend for TracingStats {
    fn increment(&self, name: &str, value: u64, tags: &Tags) {
        ::tracing::info!(target: "courier::stats", metric = name, kind = "counter", value, tags = ?tags);
    }

    fn timing(&self, name: &str, elapsed: Duration, tags: &Tags) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        ::tracing::info!(target: "courier::stats", metric = name, kind = "timing", elapsed_ms, tags = ?tags);
    }
}

/// One recorded observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Counter {
        name: String,
        value: u64,
        tags: Tags,
    },
    Timing {
        name: String,
        elapsed: Duration,
        tags: Tags,
    },
}

impl Observation {
    pub fn name(&self) -> &str {
        match self {
            Observation::Counter { name, .. } | Observation::Timing { name, .. } => name,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Observation::Counter { tags, .. } | Observation::Timing { tags, .. } => tags,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags().get(key).map(String::as_str)
    }
}

/// Records observations in memory, for tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemoryStats {
    observations: Mutex<Vec<Observation>>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of everything recorded so far, in arrival order.
    pub fn observations(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Counter observations named `name`.
    pub fn counters(&self, name: &str) -> Vec<Observation> {
        self.observations()
            .into_iter()
            .filter(|o| matches!(o, Observation::Counter { .. }) && o.name() == name)
            .collect()
    }

    /// Timing observations named `name`.
    pub fn timings(&self, name: &str) -> Vec<Observation> {
        self.observations()
            .into_iter()
            .filter(|o| matches!(o, Observation::Timing { .. }) && o.name() == name)
            .collect()
    }

    /// Sum of all increments to counter `name`.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters(name)
            .iter()
            .map(|o| match o {
                Observation::Counter { value, .. } => *value,
                Observation::Timing { .. } => 0,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn clear(&self) {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push(&self, observation: Observation) {
        self.observations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observation);
    }
}

impl StatsBackend for InMemoryStats {
    fn increment(&self, name: &str, value: u64, tags: &Tags) {
        self.push(Observation::Counter {
            name: name.to_string(),
            value,
            tags: tags.clone(),
        });
    }

    fn timing(&self, name: &str, elapsed: Duration, tags: &Tags) {
        self.push(Observation::Timing {
            name: name.to_string(),
            elapsed,
            tags: tags.clone(),
        });
    }
}
