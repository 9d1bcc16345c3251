//! Retry with exponential backoff for transient model errors.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tribunal_core::{Context, EvalError};

use crate::providers::ProviderError;

/// Backoff policy for the verifier's model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts after the first
    pub max_retries: usize,

    /// Delay before the first retry; doubles each time
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Relative jitter, 0.1 means +/-10%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Un-jittered delays, one per retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries)
            .build()
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        delay.mul_f64(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// `op` receives the 0-based attempt number. Both the call and the
    /// sleeps between attempts are abandoned as soon as `ctx` is done.
    pub async fn call<T, F, Fut>(&self, ctx: &Context, mut op: F) -> Result<T, EvalError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut delays = self.delays();
        let mut attempt = 0;
        loop {
            let err = match ctx.run(op(attempt)).await? {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(err.into());
            }
            let Some(delay) = delays.next() else {
                tracing::warn!(attempts = attempt + 1, error = %err, "retries exhausted");
                return Err(err.into());
            };

            let delay = self.jittered(delay);
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient model error, retrying"
            );
            ctx.run(tokio::time::sleep(delay)).await?;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;
    use tribunal_core::ContextError;

    #[test]
    fn test_delay_sequence() {
        let delays: Vec<Duration> = RetryPolicy::default().delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn test_delays_capped() {
        let policy = RetryPolicy {
            max_retries: 8,
            ..RetryPolicy::default()
        };
        assert!(policy.delays().all(|d| d <= Duration::from_secs(30)));
    }

    #[test]
    fn test_jitter_within_ten_percent() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.jittered(Duration::from_secs(10));
            assert!(d >= Duration::from_secs(9) && d <= Duration::from_secs(11));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let attempts = AtomicUsize::new(0);
        let started = Instant::now();
        let out = RetryPolicy::default()
            .call(&Context::background(), |_| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::other("503 service unavailable"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;
        assert_eq!(out.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(2700) && waited <= Duration::from_millis(3300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_retries() {
        let attempts = AtomicUsize::new(0);
        let out: Result<(), _> = RetryPolicy::default()
            .call(&Context::background(), |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::RateLimited { retry_after: None }) }
            })
            .await;
        assert!(matches!(out, Err(EvalError::Model { transient: true, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let attempts = AtomicUsize::new(0);
        let out: Result<(), _> = RetryPolicy::default()
            .call(&Context::background(), |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::other("invalid api key")) }
            })
            .await;
        assert!(matches!(out, Err(EvalError::Model { transient: false, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleep_is_cancellable() {
        let ctx = Context::background().with_timeout(Duration::from_millis(1500));
        let attempts = AtomicUsize::new(0);
        let out: Result<(), _> = RetryPolicy::default()
            .call(&ctx, |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Timeout(Duration::from_secs(1))) }
            })
            .await;
        assert_eq!(
            out.unwrap_err(),
            EvalError::Context(ContextError::DeadlineExceeded)
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
