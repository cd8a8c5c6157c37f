//! Cooperative cancellation carrier.
//!
//! Every suspension point in the driver selects against [`Context::done`]:
//! pool waits, retry backoff, discovery sleeps, dials and RPCs. A context
//! combines an optional deadline with a [`CancellationToken`]; children
//! inherit the tighter of the two deadlines and a child token, so
//! cancelling a parent cancels the whole subtree.

use crate::error::YdbError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Context {
    /// Root context: no deadline, cancellable via [`Context::cancel_handle`].
    pub fn background() -> Self {
        Context {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Child context whose deadline is the tighter of the parent's and
    /// `now + timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => Some(existing.min(deadline)),
            None => Some(deadline),
        };
        Context {
            deadline,
            cancel: self.cancel.child_token(),
        }
    }

    /// Child context with its own cancellation handle.
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = self.cancel.child_token();
        (
            Context {
                deadline: self.deadline,
                cancel: token.clone(),
            },
            token,
        )
    }

    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Resolves once the context is cancelled or its deadline passes.
    /// Never resolves for an unbounded, uncancelled context.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The reason the context is finished, if it is.
    pub fn err(&self) -> Option<YdbError> {
        if self.cancel.is_cancelled() {
            return Some(YdbError::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(YdbError::DeadlineExceeded);
            }
        }
        None
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::background()
    }
}
