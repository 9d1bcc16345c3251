//! Bounded, fail-fast fan-out of model calls.

use std::future::Future;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::instrument;
use tribunal_core::{Context, ContextError};

/// Run `task(i)` for every `i in 0..count` with at most `limit` running at once.
///
/// Results come back in index order regardless of completion order. The
/// first error drops every other task and is returned; so does cancellation
/// or expiry of `ctx`, as `E::from(ContextError)`. No partial results are
/// ever returned.
#[instrument(level = "debug", skip(ctx, task))]
pub async fn fan_out<T, E, F, Fut>(
    ctx: &Context,
    count: usize,
    limit: usize,
    task: F,
) -> Result<Vec<T>, E>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<ContextError>,
{
    let semaphore = Semaphore::new(limit.max(1));
    let semaphore = &semaphore;
    let task = &task;

    let slots = (0..count).map(|index| async move {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|_| E::from(ContextError::Canceled))?;
        task(index).await
    });

    match ctx.run(try_join_all(slots)).await {
        Ok(results) => results,
        Err(err) => Err(E::from(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tribunal_core::EvalError;

    #[tokio::test(start_paused = true)]
    async fn test_positional_results_despite_completion_order() {
        let ctx = Context::background();
        let out: Result<Vec<usize>, EvalError> = fan_out(&ctx, 4, 4, |i| async move {
            tokio::time::sleep(Duration::from_millis(100 * (4 - i as u64))).await;
            Ok(i * 10)
        })
        .await;
        assert_eq!(out.unwrap(), vec![0, 10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound() {
        let ctx = Context::background();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let out: Result<Vec<()>, EvalError> = fan_out(&ctx, 10, 3, |_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(out.unwrap().len(), 10);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_error_wins_and_others_stop() {
        let ctx = Context::background();
        let finished = Arc::new(AtomicUsize::new(0));

        let out: Result<Vec<()>, EvalError> = fan_out(&ctx, 5, 5, |i| {
            let finished = Arc::clone(&finished);
            async move {
                if i == 2 {
                    return Err(EvalError::NoJson);
                }
                tokio::time::sleep(Duration::from_secs(10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(out.unwrap_err(), EvalError::NoJson);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_batch() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let out: Result<Vec<()>, EvalError> = fan_out(&ctx, 3, 1, |_| async {
            tokio::time::sleep(Duration::from_millis(600)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            out.unwrap_err(),
            EvalError::Context(ContextError::DeadlineExceeded)
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();
        let calls = AtomicUsize::new(0);
        let out: Result<Vec<()>, EvalError> = fan_out(&ctx, 3, 3, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert_eq!(out.unwrap_err(), EvalError::Context(ContextError::Canceled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
