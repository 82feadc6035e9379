//! Inbound hub message processing.
//!
//! Per delivery: decode, dispatch by `messageType`, then either count a
//! success or reschedule. Rescheduling persists the message for later
//! redelivery, or dead-letters it once `attemptsMade` reaches `maxAttempts`.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, instrument, warn};

use courier_core::{ConfigResult, ScheduledMessageId, Settings};
use courier_events::{HandlerRegistry, LastError, MessageContext, MessageHandler, RawMessage};
use courier_observability::StatsBackend;

use super::config::HubConfig;
use super::error::HubError;
use super::stats::{self, HubStatsReporter};
use super::store::{DeadLetterRecord, HubStores, ScheduleRecord, StoreConnector};

/// What a reschedule decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleOutcome {
    Scheduled {
        id: ScheduledMessageId,
        due_time: DateTime<Utc>,
    },
    DeadLettered { killed_at: DateTime<Utc> },
}

/// Result of one `handle_processing` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// The payload did not decode as a JSON object; nothing was written or
    /// reported.
    Dropped,
    Succeeded,
    Rescheduled(RescheduleOutcome),
}

/// Dispatches inbound hub messages to registered handlers.
///
/// Safe to share across concurrent deliveries: handlers are looked up under a
/// read lock and the stores are set once by [`initialize`](Self::initialize).
pub struct HubMessageProcessor {
    config: HubConfig,
    handlers: HandlerRegistry,
    stats: HubStatsReporter,
    stores: OnceLock<HubStores>,
}

impl std::fmt::Debug for HubMessageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubMessageProcessor")
            .field("config", &self.config)
            .field("handlers", &self.handlers.message_types())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl HubMessageProcessor {
    pub fn new(config: HubConfig, stats: Arc<dyn StatsBackend>) -> Self {
        let stats = HubStatsReporter::new(stats, config.subscriber());
        Self {
            config,
            handlers: HandlerRegistry::new(),
            stats,
            stores: OnceLock::new(),
        }
    }

    pub fn from_settings(settings: &Settings, stats: Arc<dyn StatsBackend>) -> ConfigResult<Self> {
        Ok(Self::new(HubConfig::from_settings(settings)?, stats))
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn is_initialized(&self) -> bool {
        self.stores.get().is_some()
    }

    /// Connect the durable stores and create their indexes.
    ///
    /// Without `service.name` nothing is connected and `Ok(false)` is
    /// returned; the processor then rejects every message with
    /// [`HubError::NotInitialized`]. Calling it again after success is a no-op.
    #[instrument(skip(self, connector), fields(service = ?self.config.service_name))]
    pub async fn initialize<C>(&self, connector: &C) -> Result<bool, HubError>
    where
        C: StoreConnector + ?Sized,
    {
        if self.is_initialized() {
            return Ok(true);
        }
        let Some(storage) = &self.config.storage else {
            warn!("service.name is not configured; hub processor stays uninitialized");
            return Ok(false);
        };

        let stores = connector.connect(storage).await?;
        stores.schedule.ensure_schedule_indexes().await?;
        stores.dead_letter.ensure_dead_letter_indexes().await?;

        if self.stores.set(stores).is_err() {
            debug!("hub processor initialized concurrently; keeping the first stores");
        }
        info!(schedule = %storage.schedule, dead = %storage.dead, "hub processor initialized");
        Ok(true)
    }

    /// Install the handler for `message_type`, replacing any previous one.
    pub fn register<H>(&self, message_type: impl Into<String>, handler: H)
    where
        H: MessageHandler + 'static,
    {
        self.handlers.register(message_type, handler);
    }

    /// Process one broker delivery.
    ///
    /// Unparseable payloads are logged and dropped. A missing handler is an
    /// error; handler failures are not, they end in a reschedule.
    #[instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn handle_processing(&self, payload: &[u8]) -> Result<ProcessingOutcome, HubError> {
        let stores = self.stores.get().ok_or(HubError::NotInitialized)?;

        let message = match RawMessage::decode(payload) {
            Ok(message) => message,
            Err(err) => {
                error!(
                    error = %err,
                    payload = %String::from_utf8_lossy(payload),
                    "error while parsing hub message; dropping it"
                );
                return Ok(ProcessingOutcome::Dropped);
            }
        };

        let message_type = message.message_type.clone();
        let handler = self
            .handlers
            .get(&message_type)
            .ok_or_else(|| HubError::HandlerNotFound {
                message_type: message_type.clone(),
            })?;

        let mut ctx = MessageContext::new(message);
        let started = Instant::now();
        match handler.handle(&mut ctx).await {
            Ok(()) => {
                self.stats.timing(&message_type, stats::RESPONSE_TIME, started);
                if ctx.is_failed() {
                    debug!(
                        message_type = %message_type,
                        status_code = ?ctx.status_code(),
                        "handler marked message failed"
                    );
                    let outcome = self.reschedule_with(stores, ctx).await?;
                    Ok(ProcessingOutcome::Rescheduled(outcome))
                } else {
                    self.stats.increment(&message_type, stats::SUCCEEDED, None);
                    Ok(ProcessingOutcome::Succeeded)
                }
            }
            Err(err) => {
                warn!(message_type = %message_type, error = %err, "hub message handler failed");
                let outcome = self.reschedule_with(stores, ctx).await?;
                Ok(ProcessingOutcome::Rescheduled(outcome))
            }
        }
    }

    /// Record a failed attempt and either schedule redelivery or dead-letter.
    pub async fn reschedule_message(&self, ctx: MessageContext) -> Result<RescheduleOutcome, HubError> {
        let stores = self.stores.get().ok_or(HubError::NotInitialized)?;
        self.reschedule_with(stores, ctx).await
    }

    /// Redelivery delay after the `attempts_made`-th failure.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        self.config.delay_for(attempts_made)
    }

    async fn reschedule_with(
        &self,
        stores: &HubStores,
        ctx: MessageContext,
    ) -> Result<RescheduleOutcome, HubError> {
        let status_code = ctx.status_code();
        let error_detail = ctx.error().cloned();
        let mut message = ctx.into_raw_message();
        let message_type = message.message_type.clone();

        self.stats.increment(&message_type, stats::FAILED, status_code);

        if let Some(status_code) = status_code {
            message.set_last_error(LastError {
                status_code,
                body: error_detail,
            });
        }
        let max_attempts = message.ensure_max_attempts();
        let attempts_made = message.record_failed_attempt();

        if message.attempts_exhausted() {
            let killed_at = Utc::now();
            let record = DeadLetterRecord::new(message, killed_at);
            stores.dead_letter.insert_dead_letter(&record).await?;
            warn!(
                message_type = %message_type,
                attempts_made,
                max_attempts,
                status_code = ?status_code,
                "hub message dead-lettered"
            );
            self.stats.increment(&message_type, stats::KILLED, status_code);
            return Ok(RescheduleOutcome::DeadLettered { killed_at });
        }

        let delay = self.delay_for(attempts_made);
        let due_time = due_after(Utc::now(), delay);
        let record = ScheduleRecord::new(message, due_time);
        stores.schedule.insert_scheduled(&record).await?;
        info!(
            message_type = %message_type,
            attempts_made,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            scheduled_message_id = %record.scheduled_message_id,
            "hub message rescheduled"
        );
        self.stats.increment(&message_type, stats::SCHEDULED, status_code);

        Ok(RescheduleOutcome::Scheduled {
            id: record.scheduled_message_id,
            due_time,
        })
    }
}

fn due_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    TimeDelta::try_milliseconds(millis)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
