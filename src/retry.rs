//! Retry policy: jittered exponential backoff and a cancellation-aware
//! executor for transient LLM failures.

use crate::error::LlmError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for retry behavior on transient errors.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Initial backoff delay.
    pub initial_wait: Duration,
    /// Cap applied to every computed delay.
    pub max_wait: Duration,
    /// Exponential growth base.
    pub exponential_base: f64,
    /// Uniform jitter range added to each delay.
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_wait: Duration::from_millis(300),
            max_wait: Duration::from_secs(5),
            exponential_base: 2.0,
            jitter: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// A config with no retries (for testing).
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            exponential_base: 2.0,
            jitter: Duration::ZERO,
        }
    }

    /// A config with fast deterministic retries (for testing).
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            max_retries: 3,
            initial_wait: Duration::from_millis(10),
            max_wait: Duration::from_millis(100),
            exponential_base: 2.0,
            jitter: Duration::ZERO,
        }
    }
}

/// Compute the backoff delay before retry number `attempt + 1`.
///
/// The base delay is `initial * base^attempt`, computed in f64 so overflow
/// saturates to `max`. When `jitter > 0` a uniform offset from
/// `[-jitter, +jitter)` is added. The result is clamped to `[0, max]`;
/// with zero jitter the function is deterministic.
#[must_use]
pub fn backoff_delay(
    attempt: u32,
    initial: Duration,
    max: Duration,
    base: f64,
    jitter: Duration,
) -> Duration {
    let mut backoff = initial.as_secs_f64() * base.powi(attempt.min(i32::MAX as u32) as i32);
    if !backoff.is_finite() {
        return max;
    }

    if !jitter.is_zero() {
        let jitter_secs = jitter.as_secs_f64();
        let offset = rand::thread_rng().gen_range(-jitter_secs..jitter_secs);
        backoff += offset;
    }

    if backoff <= 0.0 {
        return Duration::ZERO;
    }
    if backoff >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(backoff)
}

/// Run `op` up to `cfg.max_retries + 1` times.
///
/// Cancellation is checked before every attempt and during every backoff
/// sleep; either returns [`LlmError::Cancelled`]. Errors failing
/// `is_retryable` are returned unwrapped. `on_retry` is invoked with the
/// 1-based number of the retry about to occur, the error that caused it,
/// and the computed delay. Exhausting the budget returns
/// [`LlmError::MaxRetriesExceeded`] carrying the last error.
pub async fn run_with_retry<T, F, Fut>(
    cancel: &CancellationToken,
    cfg: &RetryConfig,
    mut op: F,
    is_retryable: impl Fn(&LlmError) -> bool,
    mut on_retry: impl FnMut(u32, &LlmError, Duration),
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_err = None;

    for attempt in 0..=cfg.max_retries {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }
                last_err = Some(err);
            }
        }

        if attempt >= cfg.max_retries {
            break;
        }

        let delay = backoff_delay(
            attempt,
            cfg.initial_wait,
            cfg.max_wait,
            cfg.exponential_base,
            cfg.jitter,
        );
        // `last_err` was just set on the error path above.
        if let Some(err) = last_err.as_ref() {
            on_retry(attempt + 1, err, delay);
        }

        tokio::select! {
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }

    Err(LlmError::MaxRetriesExceeded {
        max_retries: cfg.max_retries,
        source: Box::new(last_err.unwrap_or(LlmError::EmptyResponse {
            message: "no attempts were made".to_string(),
        })),
    })
}
