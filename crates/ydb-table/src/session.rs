//! Server-side session handle.
//!
//! A session is addressed by an opaque id and pinned to the endpoint its
//! CreateSession ran on: the handle keeps the [`Connection`] the cluster
//! picked and issues every later RPC on it. The handle is cheap to clone;
//! sharing one session across concurrent callers is undefined behavior of
//! the protocol and is neither serialized nor detected here.

use crate::result::{QueryResult, QueryStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use ydb_cluster::{Cluster, Connection, Context, Result, TransportCode, YdbError};
use ydb_proto::{
    CreateSessionRequest, DeleteSessionRequest, ExecuteDataQueryRequest, KeepAliveRequest,
    Payload, RequestBody, SessionStatus, StreamExecuteScanQueryRequest,
};

type CloseCallback = Box<dyn FnOnce() + Send>;

struct SessionInner {
    id: String,
    conn: Arc<Connection>,
    closed: AtomicBool,
    /// Set when an error classified `must_close_session` was observed; the
    /// pool closes flagged sessions instead of reusing them.
    bad: AtomicBool,
    on_close: Mutex<Vec<CloseCallback>>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Creates a server-side session through a balanced endpoint and pins
    /// the handle to the connection used.
    pub async fn create(ctx: &Context, cluster: &Cluster) -> Result<Session> {
        let conn = cluster.connection()?;
        let payload = conn
            .invoke(ctx, RequestBody::CreateSession(CreateSessionRequest {}))
            .await?;
        match payload {
            Some(Payload::CreateSession(result)) => {
                debug!(session = %result.session_id, endpoint = conn.addr(), "session created");
                Ok(Session {
                    inner: Arc::new(SessionInner {
                        id: result.session_id,
                        conn,
                        closed: AtomicBool::new(false),
                        bad: AtomicBool::new(false),
                        on_close: Mutex::new(Vec::new()),
                    }),
                })
            }
            _ => Err(YdbError::transport(
                TransportCode::Internal,
                "unexpected CreateSession payload",
            )),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Endpoint address this session is pinned to.
    pub fn endpoint(&self) -> &str {
        self.inner.conn.addr()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn mark_bad(&self) {
        self.inner.bad.store(true, Ordering::Release);
    }

    pub fn is_bad(&self) -> bool {
        self.inner.bad.load(Ordering::Acquire)
    }

    /// Registers a callback fired exactly once when the session closes.
    pub fn on_close(&self, callback: impl FnOnce() + Send + 'static) {
        if self.is_closed() {
            callback();
            return;
        }
        self.inner.on_close.lock().unwrap().push(Box::new(callback));
    }

    /// Deletes the server-side session and fires the close callbacks.
    /// Closing an already-closed session is a no-op returning Ok.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self
            .inner
            .conn
            .invoke(
                ctx,
                RequestBody::DeleteSession(DeleteSessionRequest {
                    session_id: self.inner.id.clone(),
                }),
            )
            .await;
        let callbacks = std::mem::take(&mut *self.inner.on_close.lock().unwrap());
        for callback in callbacks {
            callback();
        }
        match result {
            Ok(_) => {
                debug!(session = %self.inner.id, "session closed");
                Ok(())
            }
            Err(err) => {
                warn!(session = %self.inner.id, error = %err, "DeleteSession failed");
                Err(err)
            }
        }
    }

    /// Pings the server-side session. `Busy` sessions are about to be
    /// evicted by the pool.
    pub async fn keep_alive(&self, ctx: &Context) -> Result<SessionStatus> {
        let payload = self
            .inner
            .conn
            .invoke(
                ctx,
                RequestBody::KeepAlive(KeepAliveRequest {
                    session_id: self.inner.id.clone(),
                }),
            )
            .await?;
        match payload {
            Some(Payload::KeepAlive(result)) => Ok(result.session_status),
            _ => Err(YdbError::transport(
                TransportCode::Internal,
                "unexpected KeepAlive payload",
            )),
        }
    }

    /// Runs a data query on this session.
    pub async fn execute_query(&self, ctx: &Context, query: &str) -> Result<QueryResult> {
        let payload = self
            .inner
            .conn
            .invoke(
                ctx,
                RequestBody::ExecuteDataQuery(ExecuteDataQueryRequest {
                    session_id: self.inner.id.clone(),
                    query: query.to_string(),
                }),
            )
            .await?;
        match payload {
            Some(Payload::ExecuteQuery(result)) => Ok(QueryResult::new(result)),
            _ => Err(YdbError::transport(
                TransportCode::Internal,
                "unexpected ExecuteDataQuery payload",
            )),
        }
    }

    /// Runs a scan query, streaming result sets as they arrive.
    pub async fn stream_scan_query(&self, ctx: &Context, query: &str) -> Result<QueryStream> {
        let receiver = self
            .inner
            .conn
            .new_stream(
                ctx,
                RequestBody::StreamExecuteScanQuery(StreamExecuteScanQueryRequest {
                    query: query.to_string(),
                }),
            )
            .await?;
        Ok(QueryStream::new(receiver))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.conn.addr())
            .field("closed", &self.is_closed())
            .field("bad", &self.is_bad())
            .finish()
    }
}
