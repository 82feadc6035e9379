//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one persisted reschedule record.
///
/// A fresh value is generated for every reschedule; the schedule store holds a
/// unique index on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduledMessageId(Uuid);

impl ScheduledMessageId {
    /// UUIDv7, so ids sort by creation time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ScheduledMessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ScheduledMessageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
