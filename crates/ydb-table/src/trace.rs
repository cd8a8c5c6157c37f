//! Retry trace hook.
//!
//! Surfaces what the retry engine observed (wall-clock latency, attempt
//! count, final error) without coupling callers to a logging framework.

use std::sync::Arc;
use std::time::Duration;
use ydb_cluster::YdbError;

/// Snapshot handed to the hook when a retry loop finishes.
#[derive(Debug)]
pub struct RetryDoneInfo<'a> {
    pub latency: Duration,
    pub attempts: usize,
    /// The error the loop ended with; `None` on success.
    pub error: Option<&'a YdbError>,
}

pub type RetryDoneHook = Arc<dyn Fn(&RetryDoneInfo<'_>) + Send + Sync>;

#[derive(Clone, Default)]
pub struct RetryTrace {
    pub on_done: Option<RetryDoneHook>,
}

impl RetryTrace {
    pub fn on_done(hook: impl Fn(&RetryDoneInfo<'_>) + Send + Sync + 'static) -> Self {
        RetryTrace {
            on_done: Some(Arc::new(hook)),
        }
    }

    pub(crate) fn emit_done(&self, info: &RetryDoneInfo<'_>) {
        if let Some(hook) = &self.on_done {
            hook(info);
        }
    }
}

impl std::fmt::Debug for RetryTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryTrace")
            .field("on_done", &self.on_done.is_some())
            .finish()
    }
}
