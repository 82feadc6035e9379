//! Sequential wait-then-retry driver.
//!
//! After attempt `i` fails, if a `schedule[i]` exists the driver suspends for
//! it and runs attempt `i + 1`; otherwise the last failure is returned. The
//! driver is a plain future: dropping it cancels a pending wait or an
//! in-flight attempt.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Every attempt failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Failure of the final attempt.
    pub error: E,
    /// Attempts made (`schedule.len() + 1` unless the schedule was empty).
    pub attempts: u32,
}

/// Run `op` until it succeeds or the schedule is used up.
///
/// `op` receives the zero-based attempt index.
pub async fn retry_with_schedule<T, E, F, Fut>(
    schedule: &[Duration],
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: core::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => match schedule.get(attempt as usize) {
                Some(delay) => {
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "attempt failed; waiting before retry"
                    );
                    tokio::time::sleep(*delay).await;
                    attempt += 1;
                }
                None => {
                    return Err(RetryExhausted {
                        error,
                        attempts: attempt + 1,
                    });
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    use courier_core::RetryPolicy;

    fn intervals(stamps: &[Instant]) -> Vec<Duration> {
        stamps.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn waits_follow_exponential_schedule() {
        let schedule = RetryPolicy::exponential(5, Duration::from_millis(10)).schedule();
        let stamps = Mutex::new(Vec::new());

        let result: Result<(), _> = retry_with_schedule(&schedule, |_attempt| {
            stamps.lock().unwrap().push(Instant::now());
            async { Err::<(), _>("boom") }
        })
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 6);
        assert_eq!(exhausted.error, "boom");

        let stamps = stamps.into_inner().unwrap();
        assert_eq!(stamps.len(), 6);
        assert_eq!(intervals(&stamps), schedule);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_follow_fibonacci_schedule() {
        let schedule = RetryPolicy::fibonacci(5, Duration::from_millis(10)).schedule();
        let stamps = Mutex::new(Vec::new());

        let _ = retry_with_schedule(&schedule, |_attempt| {
            stamps.lock().unwrap().push(Instant::now());
            async { Err::<(), _>("boom") }
        })
        .await;

        let stamps = stamps.into_inner().unwrap();
        let expected: Vec<_> = [10, 10, 20, 30, 50].into_iter().map(Duration::from_millis).collect();
        assert_eq!(intervals(&stamps), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_schedule_means_single_attempt() {
        let calls = Mutex::new(0_u32);
        let started = Instant::now();

        let result = retry_with_schedule(&[], |_attempt| {
            *calls.lock().unwrap() += 1;
            async { Err::<(), _>("boom") }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_first_success() {
        let schedule = RetryPolicy::exponential(5, Duration::from_millis(10)).schedule();

        let result = retry_with_schedule(&schedule, |attempt| async move {
            if attempt < 2 {
                Err("not yet")
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }
}
