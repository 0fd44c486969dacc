// Retry utility shared by every polling loop in the engine: status polling,
// application id discovery and YARN lookups all go through `retry_with_policy`.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::EngineError;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first one. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay between failed attempts.
    #[serde(with = "duration_ms")]
    pub delay: Duration,
    /// Multiplier applied to the delay after each failure. `1.0` keeps it fixed.
    pub backoff_multiplier: f64,
    /// Hard cap on the computed delay.
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    /// Adds up to 25% random jitter on top of the computed delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(3))
    }
}

impl RetryPolicy {
    /// Bounded policy with a constant delay.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            delay,
            backoff_multiplier: 1.0,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Policy that never gives up on its own.
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            ..Self::fixed(1, delay)
        }
    }

    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self.max_delay = max_delay.max(self.delay);
        self
    }

    /// Delay to wait after the failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .powi(attempt.min(i32::MAX as u32) as i32);
        let base_ms = self.delay.as_millis() as f64 * factor;
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64) as u64;

        let delay_ms = if self.jitter {
            capped_ms + (capped_ms as f64 * 0.25 * rand::random::<f64>()) as u64
        } else {
            capped_ms
        };
        Duration::from_millis(delay_ms)
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    /// Operation succeeded.
    Success(T),
    /// Transient failure, try again after the policy delay.
    Retry(EngineError),
    /// Permanent failure, give up immediately.
    Fail(EngineError),
}

impl<T> From<Result<T, EngineError>> for RetryAction<T> {
    fn from(result: Result<T, EngineError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) if err.is_retryable() => Self::Retry(err),
            Err(err) => Self::Fail(err),
        }
    }
}

/// Execute an async operation until it succeeds, fails permanently or the
/// policy runs out of attempts.
///
/// The `operation` closure receives the current attempt number (0-indexed).
/// Exhaustion surfaces as [`EngineError::RetriesExhausted`] wrapping the last
/// transient error. Cancellation is checked before every attempt and during
/// every sleep, and also races the attempt itself so a hung request does not
/// keep the caller waiting.
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, EngineError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let mut attempt = 0u32;
    loop {
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let action = tokio::select! {
            _ = token.cancelled() => return Err(EngineError::Cancelled),
            action = operation(attempt) => action,
        };

        match action {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => {
                let attempts = attempt.saturating_add(1);
                if policy.exhausted(attempts) {
                    return Err(EngineError::RetriesExhausted {
                        attempts,
                        last: Box::new(err),
                    });
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempts,
                    max = ?policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                sleep_or_cancel(delay, token).await?;
                attempt = attempts;
            }
        }
    }
}

/// Convenience wrapper classifying a plain `Result` with [`EngineError::is_retryable`].
pub async fn retry_result<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, EngineError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    retry_with_policy(policy, token, |attempt| {
        let fut = operation(attempt);
        async move { RetryAction::from(fut.await) }
    })
    .await
}

/// Sleep for `delay`, returning early with `Cancelled` if the token fires.
pub async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> Result<(), EngineError> {
    tokio::select! {
        _ = token.cancelled() => Err(EngineError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
