//! Durable schedule and dead-letter storage.
//!
//! The processor only ever appends: a [`ScheduleRecord`] per reschedule and a
//! [`DeadLetterRecord`] per message that used up its attempts. Reading and
//! deleting due schedule records belongs to the external redelivery sweeper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_core::ScheduledMessageId;
use courier_events::RawMessage;

use super::config::StorageConfig;
use super::error::StoreError;

/// A failed message waiting for redelivery at `due_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub scheduled_message_id: ScheduledMessageId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub due_time: DateTime<Utc>,
    pub message: RawMessage,
}

impl ScheduleRecord {
    /// A record with a freshly generated id.
    pub fn new(message: RawMessage, due_time: DateTime<Utc>) -> Self {
        Self {
            scheduled_message_id: ScheduledMessageId::new(),
            due_time,
            message,
        }
    }
}

/// A message that exhausted its attempts. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    #[serde(flatten)]
    pub message: RawMessage,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub killed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(message: RawMessage, killed_at: DateTime<Utc>) -> Self {
        Self { message, killed_at }
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message.message_id()
    }
}

/// Pending-redelivery records.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Create the unique index on `scheduledMessageId`. Idempotent.
    async fn ensure_schedule_indexes(&self) -> Result<(), StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the id already exists.
    async fn insert_scheduled(&self, record: &ScheduleRecord) -> Result<(), StoreError>;
}

/// Permanently failed messages.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Create the `killedAt` and `messageId` indexes. Idempotent.
    async fn ensure_dead_letter_indexes(&self) -> Result<(), StoreError>;

    async fn insert_dead_letter(&self, record: &DeadLetterRecord) -> Result<(), StoreError>;
}

/// Connected stores handed to the processor by a [`StoreConnector`].
#[derive(Clone)]
pub struct HubStores {
    pub schedule: Arc<dyn ScheduleStore>,
    pub dead_letter: Arc<dyn DeadLetterStore>,
}

impl std::fmt::Debug for HubStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubStores").finish_non_exhaustive()
    }
}

/// Opens the durable stores on demand.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, storage: &StorageConfig) -> Result<HubStores, StoreError>;
}

/// In-memory implementation of both stores, for tests and local runs.
///
/// Enforces the `scheduledMessageId` uniqueness constraint like a real store.
/// [`set_unavailable`](Self::set_unavailable) makes every call fail with
/// [`StoreError::Connection`].
#[derive(Debug, Default)]
pub struct InMemoryHubStore {
    scheduled: RwLock<Vec<ScheduleRecord>>,
    dead_letters: RwLock<Vec<DeadLetterRecord>>,
    connected_to: RwLock<Option<StorageConfig>>,
    schedule_indexed: AtomicBool,
    dead_letter_indexed: AtomicBool,
    unavailable: AtomicBool,
}

impl InMemoryHubStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Both stores backed by this instance, without going through a connector.
    pub fn stores(self: &Arc<Self>) -> HubStores {
        HubStores {
            schedule: self.clone(),
            dead_letter: self.clone(),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn scheduled(&self) -> Vec<ScheduleRecord> {
        self.scheduled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        self.dead_letters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn dead_letters_by_message_id(&self, message_id: &str) -> Vec<DeadLetterRecord> {
        self.dead_letters()
            .into_iter()
            .filter(|r| r.message_id() == Some(message_id))
            .collect()
    }

    /// Whether both index sets were created.
    pub fn is_indexed(&self) -> bool {
        self.schedule_indexed.load(Ordering::SeqCst)
            && self.dead_letter_indexed.load(Ordering::SeqCst)
    }

    /// Storage config of the last successful `connect`.
    pub fn connected_to(&self) -> Option<StorageConfig> {
        self.connected_to
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn write_count(&self) -> usize {
        self.scheduled().len() + self.dead_letters().len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Connection("in-memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ScheduleStore for InMemoryHubStore {
    async fn ensure_schedule_indexes(&self) -> Result<(), StoreError> {
        self.check_available()?;
        self.schedule_indexed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_scheduled(&self, record: &ScheduleRecord) -> Result<(), StoreError> {
        self.check_available()?;
        let mut scheduled = self.scheduled.write().unwrap_or_else(PoisonError::into_inner);
        if scheduled
            .iter()
            .any(|r| r.scheduled_message_id == record.scheduled_message_id)
        {
            return Err(StoreError::Duplicate(format!(
                "scheduledMessageId {}",
                record.scheduled_message_id
            )));
        }
        scheduled.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryHubStore {
    async fn ensure_dead_letter_indexes(&self) -> Result<(), StoreError> {
        self.check_available()?;
        self.dead_letter_indexed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_dead_letter(&self, record: &DeadLetterRecord) -> Result<(), StoreError> {
        self.check_available()?;
        self.dead_letters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl StoreConnector for Arc<InMemoryHubStore> {
    async fn connect(&self, storage: &StorageConfig) -> Result<HubStores, StoreError> {
        self.check_available()?;
        *self
            .connected_to
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(storage.clone());
        Ok(self.stores())
    }
}
