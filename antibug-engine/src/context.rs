//! Request-scoped cancellation and deadlines
//!
//! Every store and cache call made on behalf of a request runs through
//! [`RequestContext::run`], which races it against the caller's cancellation
//! signal and deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use antibug_core::{AntibugError, AntibugResult};
use tokio::sync::watch;
use tokio::time::Instant;

/// Cancels the [`RequestContext`]s it was created with.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation signal and optional deadline of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    cancelled: watch::Receiver<bool>,
    deadline: Option<Instant>,
    started: Instant,
}

impl RequestContext {
    /// A context that can be cancelled through the returned [`Canceller`].
    pub fn new() -> (Self, Canceller) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancelled: rx,
            deadline: None,
            started: Instant::now(),
        };
        (ctx, Canceller { tx: Arc::new(tx) })
    }

    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::new().0
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Fail if the request is already cancelled or past its deadline.
    pub fn check(&self, operation: &str) -> AntibugResult<()> {
        if self.is_cancelled() {
            return Err(self.cancelled_error(operation));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(self.deadline_error(operation));
        }
        Ok(())
    }

    /// Run `fut` unless the request is cancelled or its deadline passes first.
    ///
    /// `fut` is dropped without completing in either case.
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> AntibugResult<T>
    where
        F: Future<Output = AntibugResult<T>>,
    {
        self.check(operation)?;

        let mut cancelled = self.cancelled.clone();
        tokio::select! {
            biased;
            _ = wait_cancelled(&mut cancelled) => Err(self.cancelled_error(operation)),
            _ = wait_deadline(self.deadline) => Err(self.deadline_error(operation)),
            result = fut => result,
        }
    }

    fn cancelled_error(&self, operation: &str) -> AntibugError {
        AntibugError::Cancelled {
            operation: operation.to_string(),
        }
    }

    fn deadline_error(&self, operation: &str) -> AntibugError {
        AntibugError::DeadlineExceeded {
            operation: operation.to_string(),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
    // A dropped canceller can no longer cancel.
    if closed {
        std::future::pending::<()>().await;
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antibug_core::ErrorKind;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = RequestContext::background();
        let value = ctx.run("noop", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_pre_cancelled_context_never_starts() {
        let (ctx, canceller) = RequestContext::new();
        canceller.cancel();
        let err = ctx
            .run("find", async { Ok::<(), AntibugError>(()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_call() {
        let (ctx, canceller) = RequestContext::new();
        let pending = ctx.run("cache get", async {
            std::future::pending::<()>().await;
            Ok(())
        });
        let cancel = async {
            tokio::task::yield_now().await;
            canceller.cancel();
        };
        let (result, ()) = tokio::join!(pending, cancel);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_slow_call() {
        let ctx = RequestContext::background().with_timeout(Duration::from_millis(50));
        let err = ctx
            .run("culture find", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert!(err.to_string().contains("culture find"));
    }

    #[tokio::test]
    async fn test_dropped_canceller_does_not_cancel() {
        let (ctx, canceller) = RequestContext::new();
        drop(canceller);
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.run("noop", async { Ok(1) }).await.unwrap(), 1);
    }
}
