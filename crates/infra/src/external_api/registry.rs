//! Named external API wrappers built from `externalAPIs` configuration.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};
use tracing::{debug, info};

use courier_core::{ConfigError, ConfigResult, Settings};

use super::config::ApiConfig;
use super::wrapper::ApiWrapper;

/// Configuration section holding the named endpoints.
pub const EXTERNAL_APIS_KEY: &str = "externalAPIs";

/// Named external endpoints, each wrapped once and shared.
///
/// All wrappers share one HTTP connection pool. Registering an existing name
/// replaces the wrapper; callers holding the old `Arc` keep using it.
#[derive(Debug)]
pub struct ApiRegistry {
    apis: RwLock<HashMap<String, Arc<ApiWrapper>>>,
    client: reqwest::Client,
}

impl ApiRegistry {
    pub fn new() -> ConfigResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::validation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            apis: RwLock::new(HashMap::new()),
            client,
        }
    }

    /// Build a registry from every entry under `externalAPIs`.
    ///
    /// A missing section yields an empty registry; any invalid entry fails
    /// the whole load.
    pub fn load(settings: &Settings) -> ConfigResult<Self> {
        let registry = Self::new()?;
        let entries = settings
            .get::<Map<String, Value>>(EXTERNAL_APIS_KEY)?
            .unwrap_or_default();
        for (name, entry) in entries {
            let key = format!("{EXTERNAL_APIS_KEY}.{name}");
            if !entry.is_object() {
                return Err(ConfigError::invalid(key, "expected an object"));
            }
            let config =
                ApiConfig::from_settings(&Settings::from_value(entry)).map_err(|e| match e {
                    ConfigError::Invalid { reason, .. } => ConfigError::invalid(key, reason),
                    other => other,
                })?;
            registry.register(name, config)?;
        }
        info!(apis = ?registry.names(), "external APIs loaded");
        Ok(registry)
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        config: ApiConfig,
    ) -> ConfigResult<Arc<ApiWrapper>> {
        let name = name.into();
        let wrapper = Arc::new(ApiWrapper::with_client(
            name.clone(),
            config,
            self.client.clone(),
        )?);
        debug!(api = %name, base_url = wrapper.base_url(), "registering external API");
        self.apis
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, wrapper.clone());
        Ok(wrapper)
    }

    /// The same wrapper instance on every call until the name is re-registered.
    pub fn get(&self, name: &str) -> Option<Arc<ApiWrapper>> {
        self.apis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.apis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .apis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.apis.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
