//! Per-call cancellation and deadline, threaded through every suspension
//! point (rate-limit wait, upstream model call).

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a guarded future did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// No deadline, never cancelled unless [`CallContext::cancel`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_in(timeout)
    }

    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Share an existing token, e.g. one tied to the client connection.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Same token, deadline tightened to at most `timeout` from now.
    pub fn bounded(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(self.deadline.map_or(candidate, |d| d.min(candidate))),
        }
    }

    /// Drive `fut` until it completes, the token fires or the deadline passes.
    /// Cancellation wins over completion when both are ready.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_slow_future() {
        let ctx = CallContext::with_timeout(Duration::from_secs(2));
        let out = ctx.run(tokio::time::sleep(Duration::from_secs(10))).await;
        assert_eq!(out, Err(Interrupted::DeadlineExceeded));
    }

    #[tokio::test]
    async fn cancelled_context_never_runs_the_future() {
        let ctx = CallContext::new();
        ctx.cancel();
        let out = ctx.run(async { 42 }).await;
        assert_eq!(out, Err(Interrupted::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_keeps_the_earlier_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.bounded(Duration::from_secs(30)).deadline(), ctx.deadline());
        let tight = ctx.bounded(Duration::from_secs(1));
        assert_eq!(tight.deadline(), Some(Instant::now() + Duration::from_secs(1)));
        ctx.cancel();
        assert!(tight.is_cancelled());
    }

    #[tokio::test]
    async fn completes_without_deadline() {
        let ctx = CallContext::new();
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
        assert!(ctx.deadline().is_none());
    }
}
