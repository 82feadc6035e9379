//! Outbound HTTP to configured third-party endpoints.
//!
//! Each endpoint is an [`ApiWrapper`] built from an [`ApiConfig`]; the
//! [`ApiRegistry`] hands out one shared wrapper per configured name.

pub mod config;
pub mod error;
pub mod registry;
pub mod retry;
pub mod wrapper;

pub use config::{ApiConfig, DEFAULT_PROTOCOL};
pub use error::{ApiErrorKind, ApiRequestError};
pub use registry::{ApiRegistry, EXTERNAL_APIS_KEY};
pub use retry::{retry_with_schedule, RetryExhausted};
pub use wrapper::{ApiWrapper, Headers, RequestOptions};
