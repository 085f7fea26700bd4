//! Retry policy with exponential backoff
//!
//! [`decide`] is the pure policy: given the 1-based number of the attempt that
//! just failed and the error it failed with, it answers whether to retry and
//! after how long. The delay after attempt `n` is `base_delay * 2^(n-1)`, capped
//! at `max_delay`. Permanent errors give up on the first occurrence.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tea_dl::config::RetryConfig;
//! use tea_dl::error::FetchError;
//! use tea_dl::retry::{RetryDecision, decide};
//!
//! let config = RetryConfig { max_attempts: 3, base_delay: Duration::from_secs(2), ..Default::default() };
//! let err = FetchError::transient("connection reset");
//!
//! assert_eq!(decide(1, 3, &err, &config), RetryDecision::Retry { after: Duration::from_secs(2) });
//! assert_eq!(decide(2, 3, &err, &config), RetryDecision::Retry { after: Duration::from_secs(4) });
//! assert_eq!(decide(3, 3, &err, &config), RetryDecision::GiveUp);
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, FetchError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, rate limiting, connection reset) should return `true`.
/// Permanent failures (removed content, permission denied, invalid input) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Fetch(e) => e.is_retryable(),
            Error::Io(e) => is_transient_io(e.kind()),
            // Caller-fixable input is never retried
            Error::Validation(_) | Error::Timestamp(_) => false,
            Error::Persistence(_) => false,
            Error::Processing(_) => false,
            Error::Serialization(_) => false,
            Error::ExternalTool(_) | Error::NotSupported(_) => false,
        }
    }
}

/// Whether an I/O error kind indicates a transient condition
pub(crate) fn is_transient_io(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::Interrupted
    )
}

/// What to do after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `after`, then attempt again
    Retry {
        /// Backoff delay before the next attempt
        after: Duration,
    },
    /// Stop and report failure
    GiveUp,
}

/// Decide whether to retry after `attempt` (1-based) failed with `error`
///
/// `max_attempts` bounds the total number of tries, so no retry is offered once
/// `attempt >= max_attempts`.
pub fn decide<E: IsRetryable>(
    attempt: u32,
    max_attempts: u32,
    error: &E,
    config: &RetryConfig,
) -> RetryDecision {
    if !error.is_retryable() || attempt >= max_attempts {
        return RetryDecision::GiveUp;
    }

    let delay = backoff_delay(config.base_delay, attempt).min(config.max_delay);
    let after = if config.jitter {
        add_jitter(delay)
    } else {
        delay
    };

    RetryDecision::Retry { after }
}

/// Backoff delay after the given 1-based attempt: `base * 2^(attempt-1)`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

/// Execute an async operation, retrying according to [`decide`]
///
/// Used for one-shot operations outside the fetch job state machine.
///
/// ```no_run
/// use tea_dl::config::RetryConfig;
/// use tea_dl::error::FetchError;
/// use tea_dl::retry::with_retry;
///
/// # async fn example() -> Result<(), FetchError> {
/// let config = RetryConfig::default();
/// let value = with_retry(&config, || async { Ok::<_, FetchError>(42) }).await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => match decide(attempt, config.max_attempts, &e, config) {
                RetryDecision::Retry { after } => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = config.max_attempts,
                        delay_ms = after.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(after).await;
                }
                RetryDecision::GiveUp => {
                    if e.is_retryable() {
                        tracing::error!(
                            error = %e,
                            attempts = attempt,
                            "Operation failed after all retry attempts exhausted"
                        );
                    } else {
                        tracing::error!(error = %e, "Operation failed with non-retryable error");
                    }
                    return Err(e);
                }
            },
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
