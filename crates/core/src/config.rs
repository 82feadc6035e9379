//! Layered key/value configuration.
//!
//! Keys are dotted paths (`service.storage.host`). Layers are merged with
//! [`figment`], later layers winning, so a JSON document can be overridden by
//! environment variables:
//!
//! ```text
//! COURIER__SERVICE__NAME=orders          -> service.name = "orders"
//! COURIER__SERVICE__RETRY_SCHEDULE=[5000] -> service.retrySchedule = [5000]
//! ```

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// Separator between path segments in environment variable names.
const ENV_SEPARATOR: &str = "__";

/// Key reported for errors about the document as a whole.
const ROOT_KEY: &str = "<root>";

/// Resolved configuration layers.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    figment: Figment,
}

impl Settings {
    /// Empty configuration; every lookup falls back to its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// A single layer holding `root`, which should be a JSON object.
    pub fn from_value(root: Value) -> Self {
        Self {
            figment: Figment::from(Serialized::defaults(root)),
        }
    }

    /// Parse a JSON document. The top level must be an object.
    pub fn from_json_str(input: &str) -> ConfigResult<Self> {
        let figment = Figment::from(Json::string(input));
        figment
            .extract::<Map<String, Value>>()
            .map_err(|e| ConfigError::invalid(ROOT_KEY, e.to_string()))?;
        Ok(Self { figment })
    }

    /// Collect `PREFIX__A__B=value` variables from the process environment.
    ///
    /// Segments are mapped to camelCase (`RETRY_SCHEDULE` -> `retrySchedule`).
    /// Values that parse as numbers, booleans or arrays keep that type.
    pub fn from_env(prefix: &str) -> Self {
        let env = Env::prefixed(&format!("{prefix}{ENV_SEPARATOR}"))
            .split(ENV_SEPARATOR)
            .map(|key| camel_case_path(key.as_str()).into())
            .lowercase(false);
        Self {
            figment: Figment::from(env),
        }
    }

    /// Overlay `value` at `key`.
    pub fn with<T: Serialize>(self, key: &str, value: T) -> Self {
        Self {
            figment: self.figment.merge(Serialized::default(key, value)),
        }
    }

    /// Overlay `other` on top of `self`; objects merge recursively, every
    /// other value in `other` replaces the one in `self`.
    pub fn merge(self, other: Settings) -> Self {
        Self {
            figment: self.figment.merge(other.figment),
        }
    }

    /// Decode the value at `key`. Absent and `null` both resolve to `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<Option<T>> {
        match self.figment.extract_inner::<Option<T>>(key) {
            Ok(value) => Ok(value),
            Err(err) if err.missing() => Ok(None),
            Err(err) => Err(ConfigError::invalid(key, err.to_string())),
        }
    }

    /// Decode the value at `key`, or return `default` when it is absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> ConfigResult<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Decode the value at `key`, failing when it is absent.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<T> {
        self.get(key)?.ok_or_else(|| ConfigError::missing(key))
    }

    /// Decode every layer as one value.
    pub fn extract<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        self.figment
            .extract()
            .map_err(|e| ConfigError::invalid(ROOT_KEY, e.to_string()))
    }
}

/// `SERVICE.RETRY_SCHEDULE` -> `service.retrySchedule`
fn camel_case_path(key: &str) -> String {
    key.split('.')
        .map(camel_case_segment)
        .collect::<Vec<_>>()
        .join(".")
}

fn camel_case_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper_next = false;
    for ch in segment.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use serde_json::json;

    #[test]
    fn resolves_dotted_keys() {
        let settings = Settings::from_value(json!({
            "service": {"name": "orders", "storage": {"host": "postgres://db"}}
        }));

        assert_eq!(
            settings.get::<String>("service.name").unwrap().as_deref(),
            Some("orders")
        );
        assert_eq!(
            settings.require::<String>("service.storage.host").unwrap(),
            "postgres://db"
        );
        assert_eq!(settings.get::<String>("service.missing").unwrap(), None);
        assert_eq!(settings.get_or("service.port", 8080_u16).unwrap(), 8080);
    }

    #[test]
    fn null_reads_as_absent() {
        let settings = Settings::from_value(json!({"service": {"name": null}}));
        assert_eq!(settings.get::<String>("service.name").unwrap(), None);
    }

    #[test]
    fn reports_type_mismatches_with_the_key() {
        let settings = Settings::new().with("service.retrySchedule", "soon");
        let err = settings.get::<Vec<u64>>("service.retrySchedule").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "service.retrySchedule"));
    }

    #[test]
    fn require_reports_missing_key() {
        let err = Settings::new().require::<String>("service.name").unwrap_err();
        assert_eq!(err, ConfigError::missing("service.name"));
    }

    #[test]
    fn env_vars_map_to_camel_case_keys() {
        Jail::expect_with(|jail| {
            jail.set_env("COURIER__SERVICE__NAME", "orders");
            jail.set_env("COURIER__SERVICE__RETRY_SCHEDULE", "[10,20]");
            jail.set_env("OTHER__SERVICE__NAME", "ignored");

            let settings = Settings::from_env("COURIER");
            assert_eq!(
                settings.get::<String>("service.name").unwrap().as_deref(),
                Some("orders")
            );
            assert_eq!(
                settings.get::<Vec<u64>>("service.retrySchedule").unwrap(),
                Some(vec![10, 20])
            );
            Ok(())
        });
    }

    #[test]
    fn env_overrides_the_document() {
        Jail::expect_with(|jail| {
            jail.set_env("COURIER__SERVICE__STORAGE__HOST", "postgres://env");

            let document = Settings::from_json_str(
                r#"{"service": {"name": "orders", "storage": {"host": "postgres://file"}}}"#,
            )
            .unwrap();
            let settings = document.merge(Settings::from_env("COURIER"));

            assert_eq!(settings.require::<String>("service.name").unwrap(), "orders");
            assert_eq!(
                settings.require::<String>("service.storage.host").unwrap(),
                "postgres://env"
            );
            Ok(())
        });
    }

    #[test]
    fn later_layers_win_and_objects_merge() {
        let base = Settings::from_json_str(
            r#"{"service": {"name": "orders", "storage": {"host": "a"}}}"#,
        )
        .unwrap();
        let overlay = Settings::new().with("service.storage.host", "b");

        let merged = base.merge(overlay);
        assert_eq!(merged.require::<String>("service.name").unwrap(), "orders");
        assert_eq!(merged.require::<String>("service.storage.host").unwrap(), "b");
    }

    #[test]
    fn rejects_non_object_documents() {
        assert!(Settings::from_json_str("[1, 2]").is_err());
        assert!(Settings::from_json_str("{not json").is_err());
    }

    #[test]
    fn keys_with_dots_survive_inside_objects() {
        let settings = Settings::from_value(json!({"externalAPIs": {"orders.v2": {"host": "x"}}}));
        let apis = settings.require::<Map<String, Value>>("externalAPIs").unwrap();
        assert_eq!(apis.keys().collect::<Vec<_>>(), vec!["orders.v2"]);
    }

    #[test]
    fn camel_cases_env_segments() {
        assert_eq!(camel_case_path("SERVICE.RETRY_SCHEDULE"), "service.retrySchedule");
        assert_eq!(camel_case_path("EXTERNAL_APIS.ORDERS.HOST"), "externalApis.orders.host");
    }
}
