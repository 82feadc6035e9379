//! One configured external HTTP endpoint.
//!
//! Builds requests against `protocol://host`, bounds each attempt with the
//! configured timeout, classifies responses, and drives retries from the
//! endpoint's backoff schedule.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use courier_core::{ConfigError, ConfigResult, RetryPolicy};

use super::config::ApiConfig;
use super::error::{ApiRequestError, AttemptFailure};
use super::retry::retry_with_schedule;

/// Custom request headers, sent verbatim.
pub type Headers = HashMap<String, String>;

/// Everything needed to issue one logical request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// Serialized as the URL query string.
    pub query: Vec<(String, String)>,
    /// Serialized as a JSON payload.
    pub body: Option<Value>,
    pub headers: Headers,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query: Vec::new(),
            body: None,
            headers: Headers::new(),
        }
    }

    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Flatten a JSON object into query parameters. Strings are sent as-is,
    /// other scalars in their JSON form; non-objects add nothing.
    pub fn with_query(mut self, query: &Value) -> Self {
        if let Value::Object(map) = query {
            for (key, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                self.query.push((key.clone(), value));
            }
        }
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: &Headers) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// A configured external endpoint.
///
/// Immutable after construction; re-registering a name in the
/// [`ApiRegistry`](super::ApiRegistry) swaps in a new instance instead.
#[derive(Debug, Clone)]
pub struct ApiWrapper {
    name: String,
    config: ApiConfig,
    base_url: String,
    schedule: Vec<Duration>,
    client: reqwest::Client,
}

impl ApiWrapper {
    /// Build an endpoint with its own HTTP client.
    pub fn new(name: impl Into<String>, config: ApiConfig) -> ConfigResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::validation(format!("failed to build HTTP client: {e}")))?;
        Self::with_client(name, config, client)
    }

    /// Build an endpoint sharing an existing connection pool.
    pub fn with_client(
        name: impl Into<String>,
        config: ApiConfig,
        client: reqwest::Client,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            base_url: config.base_url(),
            schedule: config.retry.schedule(),
            config,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn protocol(&self) -> &str {
        &self.config.protocol
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config.timeout
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.config.retry
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Waits between attempts, precomputed from the retry policy.
    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.is_empty() || path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub async fn get(
        &self,
        path: &str,
        query: Option<&Value>,
        headers: Option<&Headers>,
    ) -> Result<Value, ApiRequestError> {
        let mut options = RequestOptions::new(Method::GET);
        if let Some(query) = query {
            options = options.with_query(query);
        }
        if let Some(headers) = headers {
            options = options.with_headers(headers);
        }
        self.request(path, options).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<&Value>,
        headers: Option<&Headers>,
    ) -> Result<Value, ApiRequestError> {
        self.request(path, with_body(Method::POST, body, headers)).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: Option<&Value>,
        headers: Option<&Headers>,
    ) -> Result<Value, ApiRequestError> {
        self.request(path, with_body(Method::PUT, body, headers)).await
    }

    pub async fn delete(
        &self,
        path: &str,
        headers: Option<&Headers>,
    ) -> Result<Value, ApiRequestError> {
        let mut options = RequestOptions::new(Method::DELETE);
        if let Some(headers) = headers {
            options = options.with_headers(headers);
        }
        self.request(path, options).await
    }

    /// Issue an arbitrary request with the endpoint's timeout and retry rules.
    ///
    /// Any 2xx resolves with the decoded body. Non-2xx statuses, transport
    /// failures and timeouts are retried along the schedule; once it is used
    /// up the last failure is returned as an [`ApiRequestError`].
    pub async fn request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<Value, ApiRequestError> {
        let url = self.url_for(path);
        let span = info_span!(
            "external_api_request",
            api = %self.name,
            method = %options.method,
            url = %url,
        );

        async {
            let outcome = retry_with_schedule(&self.schedule, |attempt| {
                self.send_once(&url, &options, attempt)
            })
            .await;

            match outcome {
                Ok(response) => {
                    debug!(status = response.status, "external API call succeeded");
                    response
                        .decode()
                        .map_err(|e| ApiRequestError::decode(options.method.clone(), url.clone(), e))
                }
                Err(exhausted) => {
                    let err = ApiRequestError::exhausted(
                        options.method.clone(),
                        url.clone(),
                        exhausted.error,
                        exhausted.attempts,
                    );
                    warn!(attempts = err.attempts(), error = %err, "external API call failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn send_once(
        &self,
        url: &str,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<ReceivedResponse, AttemptFailure> {
        let mut builder = self.client.request(options.method.clone(), url);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(ReceivedResponse {
                status,
                content_type,
                body: body.to_vec(),
            })
        };

        // On timeout `exchange` is dropped, which aborts the request.
        let result = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(attempt, timeout_ms = limit.as_millis() as u64, "attempt timed out");
                    return Err(AttemptFailure::Timeout(limit));
                }
            },
            None => exchange.await,
        };

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(AttemptFailure::Timeout(self.config.timeout.unwrap_or_default()));
            }
            Err(e) => {
                warn!(attempt, error = %e, "attempt failed in transport");
                return Err(AttemptFailure::Transport(e));
            }
        };

        if (200..300).contains(&response.status) {
            Ok(response)
        } else {
            warn!(attempt, status = response.status, "attempt returned non-success status");
            Err(AttemptFailure::Status {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            })
        }
    }
}

fn with_body(method: Method, body: Option<&Value>, headers: Option<&Headers>) -> RequestOptions {
    let mut options = RequestOptions::new(method);
    if let Some(body) = body {
        options = options.with_json(body.clone());
    }
    if let Some(headers) = headers {
        options = options.with_headers(headers);
    }
    options
}

/// A fully-read 2xx response.
#[derive(Debug)]
struct ReceivedResponse {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl ReceivedResponse {
    /// Empty bodies decode to `null`. A JSON content type must parse; any
    /// other body is parsed if it happens to be JSON and returned as a
    /// string otherwise.
    fn decode(self) -> Result<Value, serde_json::Error> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        let declares_json = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
        if declares_json {
            return serde_json::from_slice(&self.body);
        }
        Ok(serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned())))
    }
}
