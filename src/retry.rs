//! Bounded retry with exponential backoff.
//!
//! Every RPC call in the synchronizer goes through [`retry_with_backoff`] so
//! the attempt budget, delay growth and jitter live in one place.
//!
//! ```
//! use referral_sync::retry::{retry_with_backoff, Backoff};
//! use referral_sync::error::{IndexerError, IndexerResult};
//! use std::time::Duration;
//!
//! # async fn example() -> IndexerResult<u64> {
//! let backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(1));
//! retry_with_backoff("head", 3, &backoff, IndexerError::is_transient, || async {
//!     Ok::<_, IndexerError>(42)
//! })
//! .await
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff policy with optional ±25% jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    /// Backoff doubling from `initial` up to `max`, with jitter.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            jitter: true,
        }
    }

    /// Same policy without jitter (deterministic delays).
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// No waiting between attempts.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// - Attempt 1: `initial`
    /// - Attempt 2: `initial * 2`
    /// - ... up to `max`
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let base = self.initial.saturating_mul(factor).min(self.max);

        if !self.jitter || base.is_zero() {
            return base;
        }

        // Jitter (±25%) spreads retries from concurrent callers
        let jitter_factor = 0.5 * (rand::random::<f64>() - 0.5);
        let jitter_ms = (base.as_millis() as f64 * jitter_factor).round() as i64;
        if jitter_ms >= 0 {
            base + Duration::from_millis(jitter_ms.unsigned_abs())
        } else {
            base.saturating_sub(Duration::from_millis(jitter_ms.unsigned_abs()))
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(8))
    }
}

/// Run `operation` until it succeeds, fails permanently, or `max_attempts` is spent.
///
/// `is_retryable` decides which errors are worth another attempt; any other
/// error is returned immediately. `max_attempts` counts the first call, and a
/// value of zero is treated as one.
///
/// # Errors
///
/// Returns the last error produced by `operation`.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    label: &str,
    max_attempts: u32,
    backoff: &Backoff,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = backoff.delay(attempt);
                warn!(
                    label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
