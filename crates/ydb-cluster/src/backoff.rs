//! Exponential backoff schedules.
//!
//! Two schedules cover the retriable error space: `fast` for transient
//! flaps (base 10ms, cap 1s) and `slow` for overload (base 1s, cap 30s).
//! Delays are jittered by ±50% to spread synchronized retries.

use crate::context::Context;
use crate::error::{Result, YdbError};
use rand::Rng;
use std::time::Duration;

/// Which schedule an error category asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    None,
    Fast,
    Slow,
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Backoff { base, cap, jitter }
    }

    pub fn fast() -> Self {
        Backoff::new(Duration::from_millis(10), Duration::from_secs(1), 0.5)
    }

    pub fn slow() -> Self {
        Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 0.5)
    }

    pub fn for_kind(kind: BackoffKind) -> Option<Self> {
        match kind {
            BackoffKind::None => None,
            BackoffKind::Fast => Some(Backoff::fast()),
            BackoffKind::Slow => Some(Backoff::slow()),
        }
    }

    /// Delay for attempt `n` (zero-based): `min(cap, base * 2^n)` scaled by
    /// a uniform factor in `[1 - jitter, 1 + jitter]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX))
            .min(self.cap);
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        exp.mul_f64(factor.max(0.0))
    }

    /// Sleeps the attempt's delay, racing the context. Returns the context
    /// error if cancellation or the deadline fires first.
    pub async fn wait(&self, ctx: &Context, attempt: u32) -> Result<()> {
        let delay = self.delay(attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = ctx.done() => Err(ctx.err().unwrap_or(YdbError::Canceled)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_within_jitter_bounds() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(60), 0.5);
        for attempt in 0..4u32 {
            let nominal = 100u64 << attempt;
            let d = backoff.delay(attempt).as_millis() as u64;
            assert!(d >= nominal / 2, "attempt {attempt}: {d}ms");
            assert!(d <= nominal * 3 / 2, "attempt {attempt}: {d}ms");
        }
    }

    #[test]
    fn test_delay_caps() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(300), 0.5);
        for attempt in [5u32, 20, 63, 200] {
            assert!(backoff.delay(attempt) <= Duration::from_millis(450));
        }
    }

    #[test]
    fn test_schedules() {
        // fast: 10ms base, 1s cap; slow: 1s base, 30s cap
        assert!(Backoff::fast().delay(0) <= Duration::from_millis(15));
        assert!(Backoff::slow().delay(0) >= Duration::from_millis(500));
        assert!(Backoff::slow().delay(30) <= Duration::from_secs(45));
    }

    #[test]
    fn test_for_kind() {
        assert!(Backoff::for_kind(BackoffKind::None).is_none());
        assert!(Backoff::for_kind(BackoffKind::Fast).is_some());
        assert!(Backoff::for_kind(BackoffKind::Slow).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_races_context() {
        let backoff = Backoff::slow();
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let err = backoff.wait(&ctx, 0).await.unwrap_err();
        assert!(matches!(err, YdbError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_completes_before_open_deadline() {
        let backoff = Backoff::fast();
        let ctx = Context::background().with_timeout(Duration::from_secs(600));
        backoff.wait(&ctx, 0).await.unwrap();
    }
}
