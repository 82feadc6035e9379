//! Inbound hub message handling: dispatch, reschedule, dead-letter, stats.

pub mod config;
pub mod error;
pub mod postgres;
pub mod processor;
pub mod stats;
pub mod store;

pub use config::{default_retry_schedule, HubConfig, StorageConfig, DEFAULT_DELAY, DEFAULT_SUBSCRIBER};
pub use error::{HubError, StoreError};
pub use postgres::{PostgresConnector, PostgresHubStore};
pub use processor::{HubMessageProcessor, ProcessingOutcome, RescheduleOutcome};
pub use stats::HubStatsReporter;
pub use store::{
    DeadLetterRecord, DeadLetterStore, HubStores, InMemoryHubStore, ScheduleRecord, ScheduleStore,
    StoreConnector,
};
