//! Cancellable execution context with an optional deadline.
//!
//! Per-call timeouts and whole-server shutdown both end a command through
//! the same [`CancellationToken`]: the deadline cancels it on expiry, the
//! shutdown sweep cancels it directly. Whether the deadline had passed is
//! what tells the two apart afterwards.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ExecContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// Context that is only ever cancelled explicitly.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context that cancels itself once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Handle that cancels this context when triggered.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Resolves once the context is cancelled, cancelling it first if the
    /// deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => self.token.cancel(),
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}
