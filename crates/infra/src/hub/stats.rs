//! Hub message outcome metrics.

use std::sync::Arc;
use std::time::Instant;

use courier_observability::{StatsBackend, Tags};

pub const SUCCEEDED: &str = "succeeded";
pub const FAILED: &str = "failed";
pub const SCHEDULED: &str = "scheduled";
pub const KILLED: &str = "killed";
pub const RESPONSE_TIME: &str = "response_time";

const METRIC_PREFIX: &str = "hub.messages";

/// Reports hub message outcomes as `hub.messages.<suffix>` metrics tagged
/// with `messageType`, `subscriber` and, when known, `failureCode`.
#[derive(Clone)]
pub struct HubStatsReporter {
    backend: Arc<dyn StatsBackend>,
    subscriber: String,
}

impl std::fmt::Debug for HubStatsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubStatsReporter")
            .field("subscriber", &self.subscriber)
            .finish_non_exhaustive()
    }
}

impl HubStatsReporter {
    pub fn new(backend: Arc<dyn StatsBackend>, subscriber: impl Into<String>) -> Self {
        Self {
            backend,
            subscriber: subscriber.into(),
        }
    }

    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    pub fn increment(&self, message_type: &str, suffix: &str, failure_code: Option<u16>) {
        let mut tags = self.tags(message_type);
        if let Some(code) = failure_code {
            tags.insert("failureCode".to_string(), code.to_string());
        }
        self.backend.increment(&metric_name(suffix), 1, &tags);
    }

    /// Elapsed time from `started` to now.
    pub fn timing(&self, message_type: &str, suffix: &str, started: Instant) {
        self.backend
            .timing(&metric_name(suffix), started.elapsed(), &self.tags(message_type));
    }

    fn tags(&self, message_type: &str) -> Tags {
        let mut tags = Tags::new();
        tags.insert("messageType".to_string(), message_type.to_string());
        tags.insert("subscriber".to_string(), self.subscriber.clone());
        tags
    }
}

fn metric_name(suffix: &str) -> String {
    format!("{METRIC_PREFIX}.{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_observability::InMemoryStats;

    #[test]
    fn tags_counters_with_failure_code() {
        let stats = InMemoryStats::arc();
        let reporter = HubStatsReporter::new(stats.clone(), "orders");

        reporter.increment("order.created", FAILED, Some(503));
        reporter.increment("order.created", SUCCEEDED, None);

        let failed = stats.counters("hub.messages.failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].tag("messageType"), Some("order.created"));
        assert_eq!(failed[0].tag("subscriber"), Some("orders"));
        assert_eq!(failed[0].tag("failureCode"), Some("503"));

        let succeeded = stats.counters("hub.messages.succeeded");
        assert_eq!(succeeded[0].tag("failureCode"), None);
    }

    #[test]
    fn timings_carry_type_and_subscriber() {
        let stats = InMemoryStats::arc();
        let reporter = HubStatsReporter::new(stats.clone(), "orders");

        reporter.timing("order.created", RESPONSE_TIME, Instant::now());

        let timings = stats.timings("hub.messages.response_time");
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].tag("subscriber"), Some("orders"));
        assert_eq!(timings[0].tag("failureCode"), None);
    }
}
