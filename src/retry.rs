//! Retry an async operation until it succeeds, fails fatally, or a deadline passes.
//!
//! Every attempt classifies its own failure as [`RetryError::Retryable`] or
//! [`RetryError::Fatal`]. Retryable failures are retried with exponential
//! backoff and jitter; the last one is kept so a timeout can report what it
//! was still waiting for.
//!
//! ```ignore
//! use acme_provider::retry::{retry_until, RetryConfig, RetryError};
//!
//! let bucket = retry_until(&RetryConfig::default(), timeout, || async {
//!     store.get(name).await.map_err(RetryError::Retryable)
//! })
//! .await?;
//! ```

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Keep polling until the deadline.
    Retryable(E),
    /// Abort immediately.
    Fatal(E),
}

/// Why a retry loop stopped without a value.
#[derive(Debug)]
pub enum WaitError<E> {
    /// The deadline elapsed while only retryable failures were seen.
    Timeout {
        timeout: Duration,
        /// Last retryable cause, `None` if no attempt finished before the deadline.
        last: Option<E>,
    },
    /// An attempt returned a fatal error.
    Fatal(E),
}

impl<E> WaitError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    /// The error carried by the variant, if any.
    pub fn cause(&self) -> Option<&E> {
        match self {
            WaitError::Timeout { last, .. } => last.as_ref(),
            WaitError::Fatal(e) => Some(e),
        }
    }
}

impl<E: fmt::Display> fmt::Display for WaitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::Timeout {
                timeout,
                last: Some(last),
            } => write!(f, "timeout after {timeout:?}, last error: {last}"),
            WaitError::Timeout { timeout, last: None } => write!(f, "timeout after {timeout:?}"),
            WaitError::Fatal(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for WaitError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Backoff between attempts.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    fn jittered(&self, delay: Duration) -> Duration {
        // 0.5x to 1.5x of the delay
        let jitter = rand::rng().random_range(0.5..1.5);
        Duration::try_from_secs_f64(delay.as_secs_f64() * jitter).unwrap_or(delay)
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        // NaN and negative multipliers fall back to the cap
        Duration::try_from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
        .unwrap_or(self.max_delay)
    }
}

/// Deadline for timeouts too large to add to `Instant::now()`, about 30 years out.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

/// Run `attempt` until it succeeds, fails fatally, or `timeout` elapses.
///
/// The first attempt always starts. An attempt still in flight when the
/// deadline passes is dropped, and no sleep extends past the deadline.
pub async fn retry_until<F, Fut, T, E>(
    config: &RetryConfig,
    timeout: Duration,
    mut attempt: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError<E>>>,
{
    let deadline = Instant::now()
        .checked_add(timeout)
        .unwrap_or_else(far_future);
    let mut delay = config.initial_delay;
    let mut last = None;

    loop {
        match tokio::time::timeout_at(deadline, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(RetryError::Fatal(e))) => return Err(WaitError::Fatal(e)),
            Ok(Err(RetryError::Retryable(e))) => last = Some(e),
            Err(_) => return Err(WaitError::Timeout { timeout, last }),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout { timeout, last });
        }
        tokio::time::sleep(config.jittered(delay).min(deadline - now)).await;
        if Instant::now() >= deadline {
            return Err(WaitError::Timeout { timeout, last });
        }

        delay = config.next_delay(delay);
    }
}
