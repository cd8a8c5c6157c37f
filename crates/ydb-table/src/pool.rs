//! Session pool.
//!
//! Idle sessions are kept in an MRU-ordered deque: checkout pops the most
//! recently used end for cache locality, eviction scans the least recently
//! used end. The hard bound counts idle, checked-out and in-creation
//! sessions together; a checkout against a full pool parks on the waiter
//! queue and receives a returning session directly (ownership moves through
//! the queue, sessions are never in two places at once).
//!
//! The single state mutex is only ever held for state transitions, never
//! across an RPC: sessions are moved out of the pool before any network
//! call touches them.

use crate::session::Session;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ydb_cluster::{Cluster, Config, Context, Result, YdbError};
use ydb_proto::SessionStatus;

struct IdleEntry {
    session: Session,
    /// When the session went idle (or was last keep-alive'd).
    since: Instant,
}

enum WaiterSignal {
    /// A returning session, ownership included.
    Handoff(Session),
    /// Capacity freed up; re-attempt the checkout.
    Retry,
}

struct PoolState {
    /// front = least recently used, back = most recently used.
    idle: VecDeque<IdleEntry>,
    checked_out: HashSet<String>,
    /// CreateSession calls in flight; they count against the size limit.
    creating: usize,
    /// DeleteSession calls in flight; they keep their size-limit slot
    /// until the server has actually dropped the session.
    closing_sessions: usize,
    waiters: VecDeque<(u64, oneshot::Sender<WaiterSignal>)>,
    next_waiter_id: u64,
    closing: bool,
}

impl PoolState {
    fn total(&self) -> usize {
        self.idle.len() + self.checked_out.len() + self.creating + self.closing_sessions
    }
}

/// Bound on the DeleteSession issued when a session leaves the pool.
/// Deliberately detached from the caller's context: a cancelled caller must
/// not leak server-side sessions.
const SESSION_DELETE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct SessionPool {
    cluster: Arc<Cluster>,
    state: Mutex<PoolState>,
    size_limit: usize,
    /// Idle floor kept alive past the threshold; `None` disables the floor.
    keep_alive_min_size: Option<usize>,
    idle_threshold: Duration,
    keep_alive_timeout: Duration,
    create_session_timeout: Duration,
    keeper_cancel: CancellationToken,
    keeper_task: Mutex<Option<JoinHandle<()>>>,
    /// Pinged whenever a checked-out or in-creation slot frees while the
    /// pool is draining.
    drained: Notify,
}

impl SessionPool {
    /// Builds the pool and starts its keep-alive task.
    pub fn new(cluster: Arc<Cluster>, config: &Config) -> Arc<SessionPool> {
        let keep_alive_min_size = usize::try_from(config.session_pool_keep_alive_min_size).ok();
        let pool = Arc::new(SessionPool {
            cluster,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                checked_out: HashSet::new(),
                creating: 0,
                closing_sessions: 0,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
                closing: false,
            }),
            size_limit: config.session_pool_size_limit.max(1),
            keep_alive_min_size,
            idle_threshold: config.session_pool_idle_threshold,
            keep_alive_timeout: config.session_pool_keep_alive_timeout,
            create_session_timeout: config.session_pool_create_session_timeout,
            keeper_cancel: CancellationToken::new(),
            keeper_task: Mutex::new(None),
            drained: Notify::new(),
        });
        let task = tokio::spawn(keeper(
            Arc::downgrade(&pool),
            pool.keeper_cancel.clone(),
            pool.idle_threshold,
        ));
        *pool.keeper_task.lock().unwrap() = Some(task);
        pool
    }

    /// Checks a session out: most recently used idle session first, lazy
    /// creation while below the limit, otherwise a bounded wait for a
    /// returning one.
    pub async fn get(&self, ctx: &Context) -> Result<Session> {
        enum Action {
            Take(Session),
            Create,
            Wait(u64, oneshot::Receiver<WaiterSignal>),
        }

        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }

            let action = {
                let mut state = self.state.lock().unwrap();
                if state.closing {
                    return Err(YdbError::PoolClosed);
                }
                if let Some(entry) = state.idle.pop_back() {
                    state.checked_out.insert(entry.session.id().to_string());
                    Action::Take(entry.session)
                } else if state.total() < self.size_limit {
                    state.creating += 1;
                    Action::Create
                } else {
                    let id = state.next_waiter_id;
                    state.next_waiter_id += 1;
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back((id, tx));
                    Action::Wait(id, rx)
                }
            };

            match action {
                Action::Take(session) => return Ok(session),
                Action::Create => return self.create_session(ctx).await,
                Action::Wait(id, rx) => match self.wait_for_session(ctx, id, rx).await? {
                    Some(session) => return Ok(session),
                    None => continue,
                },
            }
        }
    }

    /// Returns a session. Bad or closed sessions, and any session returned
    /// to a draining pool, are closed; otherwise the oldest waiter gets it
    /// directly, or it parks at the MRU end of the idle queue.
    pub async fn put(&self, session: Session) {
        let mut session = Some(session);
        let close_it = {
            let mut state = self.state.lock().unwrap();
            let s = session.as_ref().expect("session present");
            state.checked_out.remove(s.id());

            if state.closing || s.is_bad() || s.is_closed() {
                state.closing_sessions += 1;
                true
            } else {
                // Hand off to the oldest live waiter.
                loop {
                    match state.waiters.pop_front() {
                        Some((_, tx)) => {
                            let s = session.take().expect("session present");
                            let id = s.id().to_string();
                            match tx.send(WaiterSignal::Handoff(s)) {
                                Ok(()) => {
                                    state.checked_out.insert(id);
                                    break false;
                                }
                                Err(WaiterSignal::Handoff(s)) => {
                                    // Waiter gave up; try the next one.
                                    session = Some(s);
                                }
                                Err(WaiterSignal::Retry) => unreachable!(),
                            }
                        }
                        None => {
                            let s = session.take().expect("session present");
                            state.idle.push_back(IdleEntry {
                                session: s,
                                since: Instant::now(),
                            });
                            break false;
                        }
                    }
                }
            }
        };

        if close_it {
            if let Some(session) = session.take() {
                self.close_session(session).await;
            }
        }
    }

    /// Drains the pool: new checkouts fail with `PoolClosed`, parked
    /// waiters are rejected, idle sessions close now, checked-out sessions
    /// close as they return. Waits for the drain up to the context
    /// deadline. Closing an already-closed pool returns Ok.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        let idle = {
            let mut state = self.state.lock().unwrap();
            if state.closing {
                return Ok(());
            }
            state.closing = true;
            state.waiters.clear();
            std::mem::take(&mut state.idle)
        };
        info!(idle = idle.len(), "closing session pool");

        self.keeper_cancel.cancel();
        let task = self.keeper_task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        for entry in idle {
            if let Err(err) = entry.session.close(ctx).await {
                debug!(error = %err, "closing idle session failed");
            }
        }

        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            // Register before checking, or a Put between the check and the
            // await would be lost.
            drained.as_mut().enable();
            {
                let state = self.state.lock().unwrap();
                if state.checked_out.is_empty()
                    && state.creating == 0
                    && state.closing_sessions == 0
                {
                    return Ok(());
                }
            }
            tokio::select! {
                _ = &mut drained => {}
                _ = ctx.done() => return Err(ctx.err().unwrap_or(YdbError::Canceled)),
            }
        }
    }

    /// Number of idle plus checked-out plus in-creation sessions.
    pub fn size(&self) -> usize {
        self.state.lock().unwrap().total()
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().unwrap().idle.len()
    }

    async fn create_session(&self, ctx: &Context) -> Result<Session> {
        let create_ctx = ctx.with_timeout(self.create_session_timeout);
        let result = Session::create(&create_ctx, &self.cluster).await;

        enum Outcome {
            Ready(Session),
            NeedsClose(Session),
            Err(YdbError),
        }

        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.creating -= 1;
            match result {
                Ok(session) => {
                    if state.closing {
                        state.closing_sessions += 1;
                        Outcome::NeedsClose(session)
                    } else {
                        state.checked_out.insert(session.id().to_string());
                        Outcome::Ready(session)
                    }
                }
                Err(err) => {
                    // The creation slot freed up; let a parked waiter retry.
                    if let Some((_, tx)) = state.waiters.pop_front() {
                        let _ = tx.send(WaiterSignal::Retry);
                    }
                    if state.closing {
                        self.drained.notify_waiters();
                    }
                    Outcome::Err(err)
                }
            }
        };

        match outcome {
            Outcome::Ready(session) => Ok(session),
            Outcome::NeedsClose(session) => {
                self.close_session(session).await;
                Err(YdbError::PoolClosed)
            }
            Outcome::Err(err) => Err(err),
        }
    }

    /// Deletes a session that left the pool, then releases its size-limit
    /// slot. Runs under its own deadline so a cancelled caller cannot leak
    /// the server-side session.
    async fn close_session(&self, session: Session) {
        let close_ctx = Context::background().with_timeout(SESSION_DELETE_TIMEOUT);
        if let Err(err) = session.close(&close_ctx).await {
            debug!(error = %err, "closing returned session failed");
        }
        let notify = {
            let mut state = self.state.lock().unwrap();
            state.closing_sessions -= 1;
            // The slot freed up; a parked waiter can try creation now.
            if let Some((_, tx)) = state.waiters.pop_front() {
                let _ = tx.send(WaiterSignal::Retry);
            }
            state.closing
        };
        if notify {
            self.drained.notify_waiters();
        }
    }

    /// Parks until a session is handed over, capacity frees up (`None`:
    /// caller retries), the context finishes, or the pool closes.
    async fn wait_for_session(
        &self,
        ctx: &Context,
        waiter_id: u64,
        mut rx: oneshot::Receiver<WaiterSignal>,
    ) -> Result<Option<Session>> {
        tokio::select! {
            signal = &mut rx => match signal {
                Ok(WaiterSignal::Handoff(session)) => Ok(Some(session)),
                Ok(WaiterSignal::Retry) => Ok(None),
                Err(_) => Err(YdbError::PoolClosed),
            },
            _ = ctx.done() => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.waiters.retain(|(id, _)| *id != waiter_id);
                }
                // The sender may have fired in the meantime; a session in
                // flight must not leak.
                if let Ok(WaiterSignal::Handoff(session)) = rx.try_recv() {
                    self.put(session).await;
                }
                match ctx.err() {
                    Some(YdbError::DeadlineExceeded) => Err(YdbError::PoolTimeout),
                    Some(err) => Err(err),
                    None => Err(YdbError::Canceled),
                }
            }
        }
    }

    /// One keep-alive sweep: stale idle sessions above the floor are
    /// closed, the rest are pinged. A session being pinged is out of the
    /// idle queue for the duration, so at most one keep-alive per session
    /// is ever in flight.
    async fn sweep_idle(&self) {
        let now = Instant::now();
        let mut to_close: Vec<Session> = Vec::new();
        let mut to_ping: Vec<Session> = Vec::new();

        {
            let mut state = self.state.lock().unwrap();
            if state.closing {
                return;
            }
            while let Some(entry) = state.idle.front() {
                if now.duration_since(entry.since) < self.idle_threshold {
                    break;
                }
                let entry = state.idle.pop_front().expect("front exists");
                let kept = state.total() + to_ping.len();
                match self.keep_alive_min_size {
                    Some(floor) if kept < floor => to_ping.push(entry.session),
                    _ => to_close.push(entry.session),
                }
            }
        }

        if to_close.is_empty() && to_ping.is_empty() {
            return;
        }
        debug!(
            close = to_close.len(),
            ping = to_ping.len(),
            "keep-alive sweep"
        );

        let ctx = Context::background().with_timeout(self.keep_alive_timeout);
        for session in to_close {
            if let Err(err) = session.close(&ctx).await {
                debug!(error = %err, "closing stale session failed");
            }
        }
        for session in to_ping {
            let ping_ctx = Context::background().with_timeout(self.keep_alive_timeout);
            match session.keep_alive(&ping_ctx).await {
                Ok(SessionStatus::Ready) => {
                    let to_close = {
                        let mut state = self.state.lock().unwrap();
                        if state.closing {
                            Some(session)
                        } else {
                            state.idle.push_back(IdleEntry {
                                session,
                                since: Instant::now(),
                            });
                            None
                        }
                    };
                    if let Some(session) = to_close {
                        let _ = session.close(&ctx).await;
                    }
                }
                Ok(SessionStatus::Busy) => {
                    debug!(session = session.id(), "session busy, evicting");
                    let _ = session.close(&ctx).await;
                }
                Err(err) => {
                    warn!(session = session.id(), error = %err, "keep-alive failed");
                    let _ = session.close(&ctx).await;
                }
            }
        }
    }
}

async fn keeper(pool: Weak<SessionPool>, cancel: CancellationToken, idle_threshold: Duration) {
    // Sweep at half the threshold so nothing stays stale for long.
    let tick = (idle_threshold / 2).max(Duration::from_millis(10));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(tick) => {}
        }
        let Some(pool) = pool.upgrade() else {
            return;
        };
        pool.sweep_idle().await;
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("SessionPool")
            .field("idle", &state.idle.len())
            .field("checked_out", &state.checked_out.len())
            .field("creating", &state.creating)
            .field("limit", &self.size_limit)
            .field("closing", &state.closing)
            .finish()
    }
}
