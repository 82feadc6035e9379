//! Inbound hub processor configuration (`service.*`).

use std::time::Duration;

use courier_core::{ConfigError, ConfigResult, Settings};

/// Subscriber name reported in stats tags when `service.name` is unset.
pub const DEFAULT_SUBSCRIBER: &str = "serviceName";

/// Delay used when the reschedule schedule is empty.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Redelivery delays applied after the 1st, 2nd, ... failure.
pub fn default_retry_schedule() -> Vec<Duration> {
    vec![
        Duration::from_secs(5),
        Duration::from_secs(3 * 60),
        Duration::from_secs(30 * 60),
        Duration::from_secs(6 * 60 * 60),
    ]
}

/// Where schedule and dead-letter records are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Connection string of the durable store.
    pub host: Option<String>,
    /// Schedule collection, `<service>_schedule` by default.
    pub schedule: String,
    /// Dead-letter collection, `<service>_dead_v2` by default.
    pub dead: String,
}

impl StorageConfig {
    pub fn for_service(service_name: &str) -> Self {
        Self {
            host: None,
            schedule: format!("{service_name}_schedule"),
            dead: format!("{service_name}_dead_v2"),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// Settings for one [`HubMessageProcessor`](super::HubMessageProcessor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Without it the processor never initializes.
    pub service_name: Option<String>,
    pub storage: Option<StorageConfig>,
    pub retry_schedule: Vec<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            service_name: None,
            storage: None,
            retry_schedule: default_retry_schedule(),
        }
    }
}

impl HubConfig {
    /// Configuration for a named service with default storage names.
    pub fn for_service(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            storage: Some(StorageConfig::for_service(&service_name)),
            service_name: Some(service_name),
            retry_schedule: default_retry_schedule(),
        }
    }

    pub fn with_retry_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.retry_schedule = schedule;
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Read `service.name`, `service.storage.{host,schedule,dead}` and
    /// `service.retrySchedule` (milliseconds).
    pub fn from_settings(settings: &Settings) -> ConfigResult<Self> {
        let service_name: Option<String> = settings
            .get::<String>("service.name")?
            .filter(|name| !name.trim().is_empty());

        let retry_schedule = match settings.get::<Vec<u64>>("service.retrySchedule")? {
            Some(millis) => millis.into_iter().map(Duration::from_millis).collect(),
            None => default_retry_schedule(),
        };

        let storage = match &service_name {
            Some(name) => {
                let defaults = StorageConfig::for_service(name);
                Some(StorageConfig {
                    host: settings.get("service.storage.host")?,
                    schedule: settings.get_or("service.storage.schedule", defaults.schedule)?,
                    dead: settings.get_or("service.storage.dead", defaults.dead)?,
                })
            }
            None => None,
        };

        let config = Self {
            service_name,
            storage,
            retry_schedule,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(storage) = &self.storage {
            if storage.schedule.trim().is_empty() {
                return Err(ConfigError::invalid("service.storage.schedule", "must not be empty"));
            }
            if storage.dead.trim().is_empty() {
                return Err(ConfigError::invalid("service.storage.dead", "must not be empty"));
            }
        }
        Ok(())
    }

    /// Name reported as the `subscriber` stats tag.
    pub fn subscriber(&self) -> &str {
        self.service_name.as_deref().unwrap_or(DEFAULT_SUBSCRIBER)
    }

    /// Wait before redelivery after the `attempts_made`-th failure.
    ///
    /// Past the end of the schedule the last entry repeats; an empty schedule
    /// falls back to [`DEFAULT_DELAY`].
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let index = attempts_made.saturating_sub(1) as usize;
        self.retry_schedule
            .get(index)
            .or_else(|| self.retry_schedule.last())
            .copied()
            .unwrap_or(DEFAULT_DELAY)
    }
}
