//! Bounded retry for feed fetches
//!
//! The default policy is one retry after a fixed two-second delay, then the
//! source is given up for the run. The delay schedule is still
//! expressed as initial delay × multiplier capped at `max_delay`, with optional
//! jitter, so the policy can be widened from configuration.
//!
//! # Example
//!
//! ```no_run
//! use feedsnap::retry::{IsRetryable, fetch_with_retry};
//! use feedsnap::config::RetryConfig;
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "flaky")
//!     }
//! }
//!
//! impl IsRetryable for Flaky {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() -> Result<(), Flaky> {
//! let config = RetryConfig::default();
//! let body = fetch_with_retry(&config, || async {
//!     Ok::<_, Flaky>("<rss/>".to_string())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the operation should be attempted again
    fn is_retryable(&self) -> bool;
}

/// Every fetch failure gets its retry, HTTP error statuses included.
impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. }
            | FetchError::Timeout { .. }
            | FetchError::TooManyRedirects { .. }
            | FetchError::BadStatus { .. } => true,
            // A malformed source URL will not parse any better the second time
            FetchError::InvalidUrl { .. } => false,
        }
    }
}

/// Execute an async operation, retrying retryable failures per `config`
///
/// Returns the first success, or the last error once `config.max_attempts`
/// retries are used up (so the operation runs at most `max_attempts + 1` times).
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "fetch succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "fetch failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "fetch failed after all retry attempts"
                    );
                } else {
                    tracing::error!(error = %e, "fetch failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
