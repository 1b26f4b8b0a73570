//! Exponential backoff with jitter
//!
//! Shared by the reconnect loop and the REST client's retry helper.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Largest exponent applied to the initial delay
const MAX_EXPONENT: u32 = 16;

/// Bounded exponential backoff
///
/// Attempt `n` waits `d = min(max, initial * 2^n)`, sampled uniformly in `[d/2, d]`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
        }
    }

    /// Number of delays handed out since the last reset
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Upper bound of the delay for the current attempt
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        let factor = 1u32 << self.attempt.min(MAX_EXPONENT);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Next delay to wait, advancing the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.attempt = self.attempt.saturating_add(1);

        let high = ceiling.as_millis() as u64;
        let low = high / 2;
        if high == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    /// Start over from the initial delay
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Bounded retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out
///
/// `is_transient` decides whether a failure is worth another attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = Backoff::new(policy.initial_delay, policy.max_delay);

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && backoff.attempt() < policy.max_retries => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    operation = op_name,
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
