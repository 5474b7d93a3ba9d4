//! Retry utilities with exponential backoff and jitter.
//!
//! Sub-resources of an experiment lag their parents (a Job's pods appear some
//! time after the Job) and status writes race other writers. Both are handled
//! with a bounded retry loop whose delay grows geometrically.
//!
//! # Example
//!
//! ```ignore
//! use tremor_common::retry::{retry_with_backoff_when, RetryConfig};
//!
//! let config = RetryConfig::bounded(6, Duration::from_millis(500), 5.0, 0.1);
//! retry_with_backoff_when(&config, "wait for job pods", is_missing_pods, || {
//!     find_job_pods(namespace, &selector)
//! })
//! .await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Jitter fraction: each delay is scaled by a random factor in `1 ± jitter`
    pub jitter: f64,
}

impl RetryConfig {
    /// Bounded geometric backoff: `steps` attempts starting at `initial`,
    /// multiplied by `factor` each time with the given jitter fraction.
    pub fn bounded(steps: u32, initial: Duration, factor: f64, jitter: f64) -> Self {
        Self {
            max_attempts: steps,
            initial_delay: initial,
            max_delay: Duration::from_secs(60),
            backoff_multiplier: factor,
            jitter,
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter).max(0.0)..1.0 + self.jitter);
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Only errors accepted by `should_retry` are retried; any other error is
/// returned immediately. Once `max_attempts` is exhausted the last error is
/// returned.
pub async fn retry_with_backoff_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let jittered_delay = config.jittered(delay);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: 0.1,
        }
    }

    fn any(_: &&str) -> bool {
        true
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let result: Result<i32, &str> =
            retry_with_backoff_when(&fast(3), "op", any, || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, &str> = retry_with_backoff_when(&fast(5), "op", any, || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("fail")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_max_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, &str> = retry_with_backoff_when(&fast(3), "op", any, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("always fails")
            }
        })
        .await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result: Result<i32, &str> =
            retry_with_backoff_when(&fast(5), "op", |e| *e == "conflict", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("not found")
                }
            })
            .await;

        assert_eq!(result, Err("not found"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bounded_config() {
        let config = RetryConfig::bounded(6, Duration::from_millis(500), 5.0, 0.1);
        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.next_delay(Duration::from_millis(500)), Duration::from_millis(2500));
        // capped by max_delay
        assert_eq!(config.next_delay(Duration::from_secs(50)), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_fraction() {
        let config = fast(1);
        for _ in 0..100 {
            let d = config.jittered(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(900) && d <= Duration::from_millis(1100));
        }
        let exact = RetryConfig {
            jitter: 0.0,
            ..fast(1)
        };
        assert_eq!(exact.jittered(Duration::from_millis(7)), Duration::from_millis(7));
    }
}
