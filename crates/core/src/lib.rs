//! `courier-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (no IO): configuration resolution,
//! identifiers, and backoff schedule computation.

pub mod backoff;
pub mod config;
pub mod duration;
pub mod error;
pub mod id;

pub use backoff::{compute_schedule, BackoffStrategy, RetryPolicy};
pub use config::Settings;
pub use error::{ConfigError, ConfigResult};
pub use id::ScheduledMessageId;
