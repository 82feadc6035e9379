//! Inbound hub message model.
//!
//! A message arrives as an opaque byte payload that must decode as a JSON
//! object; that is the only way decoding fails. The delivery bookkeeping
//! fields (`messageType`, `attemptsMade`, `maxAttempts`, `lastError`) are then
//! read leniently: numeric strings count as numbers, scalar message types are
//! used by their text, and anything unusable falls back to the field's
//! default. Everything else is domain payload and round-trips untouched
//! through reschedule cycles.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Attempt budget stamped on a message the first time it fails without one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Payload key carrying the producer-assigned message identifier.
pub const MESSAGE_ID_KEY: &str = "messageId";

const MESSAGE_TYPE_KEY: &str = "messageType";
const ATTEMPTS_MADE_KEY: &str = "attemptsMade";
const MAX_ATTEMPTS_KEY: &str = "maxAttempts";
const LAST_ERROR_KEY: &str = "lastError";

/// The payload was not a JSON object.
#[derive(Debug, Error)]
#[error("message payload is not a valid JSON object: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Last failure observed for a message, stamped before rescheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub status_code: u16,
    #[serde(default)]
    pub body: Option<Value>,
}

impl LastError {
    /// `None` unless `value` is an object with a usable `statusCode`.
    fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;
        let status_code = fields
            .get("statusCode")
            .and_then(lenient_count)
            .and_then(|code| u16::try_from(code).ok())?;
        let body = fields.get("body").filter(|body| !body.is_null()).cloned();
        Some(Self { status_code, body })
    }
}

/// One inbound message as decoded from the broker payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Map<String, Value>")]
pub struct RawMessage {
    /// Routing key used to pick a handler.
    pub message_type: String,
    /// Failed processing attempts so far. Never decreases.
    pub attempts_made: u32,
    /// Attempt budget; stamped with [`DEFAULT_MAX_ATTEMPTS`] on first failure
    /// and carried on the message afterwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    /// Domain payload (every other key).
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl From<Map<String, Value>> for RawMessage {
    fn from(mut fields: Map<String, Value>) -> Self {
        let message_type = fields
            .remove(MESSAGE_TYPE_KEY)
            .map(message_type_text)
            .unwrap_or_default();
        let attempts_made = fields
            .remove(ATTEMPTS_MADE_KEY)
            .as_ref()
            .and_then(lenient_count)
            .unwrap_or(0);
        let max_attempts = fields
            .remove(MAX_ATTEMPTS_KEY)
            .as_ref()
            .and_then(lenient_count);

        // An unreadable lastError stays in the payload until a new one is stamped.
        let last_error = match fields.remove(LAST_ERROR_KEY) {
            None | Some(Value::Null) => None,
            Some(value) => match LastError::from_value(&value) {
                Some(last_error) => Some(last_error),
                None => {
                    fields.insert(LAST_ERROR_KEY.to_string(), value);
                    None
                }
            },
        };

        Self {
            message_type,
            attempts_made,
            max_attempts,
            last_error,
            payload: fields,
        }
    }
}

fn message_type_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

/// Non-negative integer from a number or numeric string.
fn lenient_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => match number.as_u64() {
            Some(n) => Some(u32::try_from(n).unwrap_or(u32::MAX)),
            None => number
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc().min(f64::from(u32::MAX)) as u32),
        },
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

impl RawMessage {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            attempts_made: 0,
            max_attempts: None,
            last_error: None,
            payload: Map::new(),
        }
    }

    /// Decode a broker payload. Fails only when it is not a JSON object.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let fields: Map<String, Value> = serde_json::from_slice(bytes)?;
        Ok(Self::from(fields))
    }

    /// Encode back into a broker payload.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_attempts_made(mut self, attempts_made: u32) -> Self {
        self.attempts_made = attempts_made;
        self
    }

    /// Producer-assigned identifier, if the payload carries one.
    pub fn message_id(&self) -> Option<&str> {
        self.payload.get(MESSAGE_ID_KEY).and_then(Value::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Replace the recorded failure, including one kept raw in the payload.
    pub fn set_last_error(&mut self, last_error: LastError) {
        self.payload.remove(LAST_ERROR_KEY);
        self.last_error = Some(last_error);
    }

    /// Budget in effect; a zero budget counts as unset.
    pub fn effective_max_attempts(&self) -> u32 {
        match self.max_attempts {
            Some(max) if max > 0 => max,
            _ => DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Stamp the default budget if none is set and return the effective value.
    pub fn ensure_max_attempts(&mut self) -> u32 {
        let max = self.effective_max_attempts();
        self.max_attempts = Some(max);
        max
    }

    /// Count one more failed attempt and return the new total.
    pub fn record_failed_attempt(&mut self) -> u32 {
        self.attempts_made = self.attempts_made.saturating_add(1);
        self.attempts_made
    }

    /// Whether the attempt budget is used up.
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts_made >= self.effective_max_attempts()
    }
}
