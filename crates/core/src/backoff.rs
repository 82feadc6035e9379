//! Backoff strategies and retry schedules.
//!
//! A schedule is the ordered list of waits between successive attempts:
//! `schedule[i]` is the delay before retry `i + 1`, i.e. after the `(i + 1)`-th
//! failure. Computing it is pure and deterministic.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::millis;

/// Start interval used when none is configured.
pub const DEFAULT_START_INTERVAL: Duration = Duration::from_millis(100);

/// Backoff strategy for retries.
///
/// Parsed leniently from configuration: `"fibonacci"` and `"fib"` select
/// [`BackoffStrategy::Fibonacci`], any other string falls back to
/// [`BackoffStrategy::Exponential`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BackoffStrategy {
    /// `start * 2^i`
    #[default]
    Exponential,
    /// `start * fib(i + 1)` with `fib(1) = fib(2) = 1`
    Fibonacci,
}

impl BackoffStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffStrategy::Exponential => "exponential",
            BackoffStrategy::Fibonacci => "fibonacci",
        }
    }
}

impl From<&str> for BackoffStrategy {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "fibonacci" | "fib" => BackoffStrategy::Fibonacci,
            _ => BackoffStrategy::Exponential,
        }
    }
}

impl From<String> for BackoffStrategy {
    fn from(value: String) -> Self {
        BackoffStrategy::from(value.as_str())
    }
}

impl From<BackoffStrategy> for String {
    fn from(value: BackoffStrategy) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy: how many retries, and how long to wait before each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Backoff strategy
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Number of retries after the initial attempt (0 = single attempt)
    #[serde(default)]
    pub times: u32,
    /// Base delay, in milliseconds on the wire
    #[serde(default = "default_start_interval", with = "millis")]
    pub start_interval: Duration,
}

fn default_start_interval() -> Duration {
    DEFAULT_START_INTERVAL
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            times: 0,
            start_interval: DEFAULT_START_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(times: u32, start_interval: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            times,
            start_interval,
        }
    }

    /// Create a policy with Fibonacci backoff.
    pub fn fibonacci(times: u32, start_interval: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fibonacci,
            times,
            start_interval,
        }
    }

    /// The full wait schedule; its length is always `times`.
    pub fn schedule(&self) -> Vec<Duration> {
        compute_schedule(self.strategy, self.times, self.start_interval)
    }

    /// Attempts made on the wire when every attempt fails.
    pub fn total_attempts(&self) -> u32 {
        self.times.saturating_add(1)
    }
}

/// Compute the wait schedule for `times` retries.
///
/// Multiplication saturates instead of overflowing.
pub fn compute_schedule(
    strategy: BackoffStrategy,
    times: u32,
    start_interval: Duration,
) -> Vec<Duration> {
    let mut schedule = Vec::with_capacity(times as usize);

    match strategy {
        BackoffStrategy::Exponential => {
            for i in 0..times {
                let factor = 2_u32.checked_pow(i).unwrap_or(u32::MAX);
                schedule.push(start_interval.saturating_mul(factor));
            }
        }
        BackoffStrategy::Fibonacci => {
            let (mut current, mut next) = (1_u32, 1_u32);
            for _ in 0..times {
                schedule.push(start_interval.saturating_mul(current));
                let following = current.saturating_add(next);
                current = next;
                next = following;
            }
        }
    }

    schedule
}
