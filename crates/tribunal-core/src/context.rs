//! Cancellation and deadline propagation.
//!
//! A [`Context`] is handed to every unit execution. It carries the
//! cancellation signals of all its ancestors plus the tightest deadline among
//! them, so a child derived with [`Context::with_timeout`] expires at
//! `min(parent deadline, now + timeout)` and is cancelled whenever any
//! ancestor is.

use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Why a context is done.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation scope passed to unit executions.
#[derive(Clone, Debug, Default)]
pub struct Context {
    signals: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels the context returned alongside it by [`Context::with_cancel`].
///
/// Dropping the handle does not cancel.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child that can be cancelled independently of its parent.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut signals = self.signals.clone();
        signals.push(rx);
        (
            Context {
                signals,
                deadline: self.deadline,
            },
            CancelHandle { tx: Arc::new(tx) },
        )
    }

    /// Derive a child whose deadline is the earlier of the parent's and `now + timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Context {
            signals: self.signals.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check. Cancellation wins over an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.signals.iter().any(|rx| *rx.borrow()) {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        if let Some(err) = self.err() {
            return err;
        }

        let cancelled = async {
            if self.signals.is_empty() {
                return pending::<()>().await;
            }
            let waits = self.signals.iter().map(|rx| {
                let mut rx = rx.clone();
                Box::pin(async move {
                    // A dropped sender can never cancel.
                    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        pending::<()>().await;
                    }
                })
            });
            select_all(waits).await;
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => ContextError::Canceled,
            _ = expired => ContextError::DeadlineExceeded,
        }
    }

    /// Drive `fut` to completion unless the context finishes first.
    ///
    /// When the context wins, `fut` is dropped, which aborts any work it owns.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }
}
