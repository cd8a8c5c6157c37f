//! Retry engine.
//!
//! Drives a user operation through checkout → invoke → classify → backoff →
//! retry. There is no attempt cap; the only bound is the caller's context.
//! Retriable errors are absorbed: the caller sees success, the last
//! non-retriable error, or the context error wrapped with a retry summary.

use crate::pool::SessionPool;
use crate::session::Session;
use crate::trace::{RetryDoneInfo, RetryTrace};
use async_trait::async_trait;
use std::future::Future;
use tokio::time::Instant;
use tracing::debug;
use ydb_cluster::{Backoff, Context, Result, YdbError};

/// Source of sessions for the retry loop. The pool is the production
/// implementation; tests substitute their own.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get(&self, ctx: &Context) -> Result<Session>;
    async fn put(&self, session: Session);
}

#[async_trait]
impl SessionProvider for SessionPool {
    async fn get(&self, ctx: &Context) -> Result<Session> {
        SessionPool::get(self, ctx).await
    }

    async fn put(&self, session: Session) {
        SessionPool::put(self, session).await
    }
}

/// Runs `op` with retries until it succeeds, fails terminally, or the
/// context finishes.
///
/// `idempotent` is the caller's promise that re-executing the operation
/// after a transport failure with undefined completion is safe; without it
/// such failures are surfaced instead of retried. Sessions observed with a
/// `must_close_session` error are flagged and closed on return rather than
/// reused.
pub async fn retry<P, F, Fut>(
    provider: &P,
    ctx: &Context,
    idempotent: bool,
    trace: &RetryTrace,
    mut op: F,
) -> Result<()>
where
    P: SessionProvider + ?Sized,
    F: FnMut(Context, Session) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let started = Instant::now();
    let mut attempts: usize = 0;
    let mut last_error: Option<YdbError> = None;

    let result = loop {
        if let Some(cause) = ctx.err() {
            break Err(interrupted(attempts, last_error.take(), cause));
        }
        attempts += 1;

        let session = match provider.get(ctx).await {
            Ok(session) => session,
            Err(err) => {
                if !err.retry_allowed(idempotent) {
                    break Err(err);
                }
                debug!(attempt = attempts, error = %err, "session checkout failed, retrying");
                match wait_backoff(ctx, &err, attempts).await {
                    Ok(()) => {
                        last_error = Some(err);
                        continue;
                    }
                    Err(cause) => break Err(interrupted(attempts, Some(err), cause)),
                }
            }
        };

        match op(ctx.clone(), session.clone()).await {
            Ok(()) => {
                provider.put(session).await;
                break Ok(());
            }
            Err(err) => {
                if err.must_close_session() {
                    session.mark_bad();
                }
                provider.put(session).await;

                if !err.retry_allowed(idempotent) {
                    break Err(err);
                }
                debug!(attempt = attempts, error = %err, "operation failed, retrying");
                match wait_backoff(ctx, &err, attempts).await {
                    Ok(()) => last_error = Some(err),
                    Err(cause) => break Err(interrupted(attempts, Some(err), cause)),
                }
            }
        }
    };

    trace.emit_done(&RetryDoneInfo {
        latency: started.elapsed(),
        attempts,
        error: result.as_ref().err(),
    });
    result
}

/// Sleeps the schedule the error asks for, racing the context. `attempts`
/// is one-based; attempt `n` waits with exponent `n - 1`.
async fn wait_backoff(ctx: &Context, err: &YdbError, attempts: usize) -> Result<()> {
    match Backoff::for_kind(err.backoff_kind()) {
        Some(backoff) => {
            let exponent = (attempts.saturating_sub(1)).min(u32::MAX as usize) as u32;
            backoff.wait(ctx, exponent).await
        }
        None => Ok(()),
    }
}

fn interrupted(attempts: usize, last_error: Option<YdbError>, cause: YdbError) -> YdbError {
    let last_error = last_error.unwrap_or_else(|| cause.clone());
    YdbError::RetryInterrupted {
        attempts,
        last_error: Box::new(last_error),
        cause: Box::new(cause),
    }
}
