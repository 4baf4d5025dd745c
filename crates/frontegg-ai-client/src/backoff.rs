//! Retry with exponential backoff.
//!
//! [`retry`] runs an async operation until it succeeds, the retry predicate rejects
//! the failure, or the attempt budget is spent. The last failure is returned as is.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::info;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Decides whether a failure is worth another attempt.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Computes the delay after a failed `attempt` (1-based) given the base delay.
pub type DelayFn = Arc<dyn Fn(u32, Duration) -> Duration + Send + Sync>;

/// How many times to run an operation and how long to wait in between.
pub struct RetryPolicy<E> {
    /// Total attempts, including the first. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Input to the delay function.
    pub base_delay: Duration,
    /// Retry every failure when unset.
    pub should_retry: Option<RetryPredicate<E>>,
    /// Defaults to [`exponential_delay`].
    pub delay_for_attempt: Option<DelayFn>,
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: DEFAULT_BASE_DELAY,
            should_retry: None,
            delay_for_attempt: None,
        }
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            should_retry: self.should_retry.clone(),
            delay_for_attempt: self.delay_for_attempt.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("should_retry", &self.should_retry.is_some())
            .field("delay_for_attempt", &self.delay_for_attempt.is_some())
            .finish()
    }
}

impl<E> RetryPolicy<E> {
    /// Policy with `max_attempts` attempts and the default delay.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Only retry failures accepted by `predicate`.
    #[must_use]
    pub fn with_should_retry(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Replace the delay function.
    #[must_use]
    pub fn with_delay_fn(
        mut self,
        delay: impl Fn(u32, Duration) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay_for_attempt = Some(Arc::new(delay));
        self
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.delay_for_attempt.as_ref().map_or_else(
            || exponential_delay(attempt, self.base_delay),
            |delay| delay(attempt, self.base_delay),
        )
    }
}

/// `base_delay * 2^attempt`, saturating at [`Duration::MAX`].
#[must_use]
pub fn exponential_delay(attempt: u32, base_delay: Duration) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base_delay.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

/// Run `operation` under `policy`.
///
/// # Errors
///
/// Returns the failure of the last attempt, either because the attempt budget is
/// spent or because `should_retry` rejected it.
pub async fn retry<T, E, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy<E>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let retryable = policy.should_retry.as_ref().is_none_or(|p| p(&error));
                if attempt >= max_attempts || !retryable {
                    return Err(error);
                }

                let delay = policy.delay_after(attempt);
                info!(
                    "Retrying {operation_name} (attempt {attempt}/{max_attempts}) in {delay:?}: {error}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
