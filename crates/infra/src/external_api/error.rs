//! Outbound request error classification.

use std::time::Duration;

use reqwest::Method;
use thiserror::Error;

/// Why an outbound call ultimately failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The counterparty answered with a non-2xx status.
    Status,
    /// The request never produced a response (connect, DNS, TLS, reset).
    Transport,
    /// An attempt exceeded the configured per-attempt timeout.
    Timeout,
    /// A 2xx response declared JSON but its body did not parse.
    Decode,
}

/// Failure of a single attempt on the wire.
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    Status { status: u16, body: String },
    Transport(reqwest::Error),
    Timeout(Duration),
}

impl core::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AttemptFailure::Status { status, .. } => write!(f, "status {status}"),
            AttemptFailure::Transport(e) => write!(f, "{e}"),
            AttemptFailure::Timeout(t) => write!(f, "timed out after {}ms", t.as_millis()),
        }
    }
}

/// Outbound call failed after the retry budget was exhausted.
///
/// Carries the last observed status code (if any), the underlying transport
/// error (if any, via `source()`), and a message of the form
/// `"<METHOD> <url> failed: <cause> (<n> attempts)"`. Timeouts read
/// `failed: timed out after <ms>ms` and report [`ApiRequestError::is_timeout`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiRequestError {
    kind: ApiErrorKind,
    method: Method,
    url: String,
    status_code: Option<u16>,
    body: Option<String>,
    attempts: u32,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ApiRequestError {
    pub(crate) fn exhausted(
        method: Method,
        url: String,
        failure: AttemptFailure,
        attempts: u32,
    ) -> Self {
        let message = format!("{method} {url} failed: {failure} ({attempts} attempts)");
        let (kind, status_code, body, source) = match failure {
            AttemptFailure::Status { status, body } => {
                (ApiErrorKind::Status, Some(status), Some(body), None)
            }
            AttemptFailure::Transport(e) => {
                let status = e.status().map(|s| s.as_u16());
                let source: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
                (ApiErrorKind::Transport, status, None, Some(source))
            }
            AttemptFailure::Timeout(_) => (ApiErrorKind::Timeout, None, None, None),
        };

        Self {
            kind,
            method,
            url,
            status_code,
            body,
            attempts,
            message,
            source,
        }
    }

    pub(crate) fn decode(method: Method, url: String, error: serde_json::Error) -> Self {
        Self {
            kind: ApiErrorKind::Decode,
            message: format!("{method} {url} failed: invalid JSON response: {error}"),
            method,
            url,
            status_code: None,
            body: None,
            attempts: 1,
            source: Some(Box::new(error)),
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ApiErrorKind::Timeout
    }

    /// Last HTTP status observed, if the counterparty answered at all.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Body of the last non-2xx response.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Attempts made on the wire before giving up.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Underlying transport error, when the last attempt had no response.
    pub fn transport_error(&self) -> Option<&reqwest::Error> {
        self.source
            .as_deref()
            .and_then(|e| e.downcast_ref::<reqwest::Error>())
    }
}
