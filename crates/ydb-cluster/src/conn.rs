//! Per-endpoint connection lifecycle.
//!
//! A [`Connection`] owns the (lazily dialed) channel to one endpoint and is
//! shared by every RPC routed there; it is not owned by any session. Each
//! outgoing request gets the credentials token, a deadline derived from the
//! caller context and the per-RPC timeout, and the operation-params
//! sub-message. Transport failures whose policy says so pessimize the
//! endpoint in the registry before propagating.

use crate::config::Config;
use crate::context::Context;
use crate::endpoint::Registry;
use crate::error::{Result, TransportCode, YdbError};
use crate::channel::Channel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use ydb_proto::{
    OperationParams, Payload, RequestBody, RequestFrame, ResponsePayload, StreamPart,
};

pub struct Connection {
    addr: String,
    config: Arc<Config>,
    registry: Arc<Registry>,
    tls: Option<Arc<rustls::ClientConfig>>,
    /// Lazy channel; the mutex serializes dialing, nothing else.
    channel: Mutex<Option<Arc<Channel>>>,
    closed: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        addr: String,
        config: Arc<Config>,
        registry: Arc<Registry>,
        tls: Option<Arc<rustls::ClientConfig>>,
    ) -> Self {
        Connection {
            addr,
            config,
            registry,
            tls,
            channel: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Shared channel to the endpoint, dialing on first use. Re-dials
    /// transparently after the previous channel broke.
    pub async fn channel(&self, ctx: &Context) -> Result<Arc<Channel>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(YdbError::transport(
                TransportCode::Unavailable,
                "connection closed",
            ));
        }
        let mut guard = self.channel.lock().await;
        if let Some(channel) = guard.as_ref() {
            if !channel.is_broken() {
                return Ok(Arc::clone(channel));
            }
        }
        let dial_ctx = ctx.with_timeout(self.config.dial_timeout);
        let channel = match Channel::connect(&dial_ctx, &self.addr, self.tls.clone()).await {
            Ok(channel) => Arc::new(channel),
            Err(err) => {
                self.maybe_pessimize(&err);
                return Err(err);
            }
        };
        *guard = Some(Arc::clone(&channel));
        Ok(channel)
    }

    /// Unary RPC. Returns the operation payload on success.
    pub async fn invoke(&self, ctx: &Context, body: RequestBody) -> Result<Option<Payload>> {
        let channel = self.channel(ctx).await?;
        let frame = self.frame(ctx, body).await?;
        let rpc_ctx = ctx.with_timeout(self.config.request_timeout);
        let result = tokio::select! {
            r = channel.invoke(frame) => r,
            _ = rpc_ctx.done() => Err(self.rpc_interrupted(ctx)),
        };
        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                self.maybe_pessimize(&err);
                return Err(err);
            }
        };
        match payload {
            ResponsePayload::Operation(op) => {
                if op.status.is_success() {
                    Ok(op.result)
                } else {
                    Err(YdbError::from_operation(op))
                }
            }
            ResponsePayload::Rejected(rejection) => {
                let err = YdbError::from_rejection(rejection);
                self.maybe_pessimize(&err);
                Err(err)
            }
            ResponsePayload::StreamPart(_) => Err(YdbError::transport(
                TransportCode::Internal,
                "stream response on a unary request",
            )),
        }
    }

    /// Server-streaming RPC. Establishment is bounded by the stream
    /// timeout; consumption is bounded only by the caller.
    pub async fn new_stream(
        &self,
        ctx: &Context,
        body: RequestBody,
    ) -> Result<mpsc::UnboundedReceiver<Result<StreamPart>>> {
        let channel = self.channel(ctx).await?;
        let frame = self.frame(ctx, body).await?;
        let rpc_ctx = ctx.with_timeout(self.config.stream_timeout);
        let result = tokio::select! {
            r = channel.new_stream(frame) => r,
            _ = rpc_ctx.done() => Err(self.rpc_interrupted(ctx)),
        };
        if let Err(err) = &result {
            self.maybe_pessimize(err);
        }
        result
    }

    /// Takes the connection out of service without tearing the channel
    /// down: new RPCs are refused, in-flight ones keep their own channel
    /// handle and finish normally. Used when discovery drops the endpoint.
    pub fn retire(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut guard) = self.channel.try_lock() {
            guard.take();
        }
        debug!(endpoint = %self.addr, "connection retired");
    }

    /// Closes the channel, failing in-flight RPCs. Idempotent; the endpoint
    /// is Destroyed by the registry before this runs during cluster
    /// shutdown.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let channel = self.channel.lock().await.take();
        if let Some(channel) = channel {
            channel.close().await;
        }
        debug!(endpoint = %self.addr, "connection closed");
    }

    async fn frame(&self, ctx: &Context, body: RequestBody) -> Result<RequestFrame> {
        let token = self.config.credentials.token(ctx).await?;
        let auth_token = if token.is_empty() { None } else { Some(token) };
        Ok(RequestFrame::new(body)
            .with_auth_token(auth_token)
            .with_operation_params(OperationParams::sync(
                self.config.operation_timeout,
                self.config.operation_cancel_after,
            )))
    }

    /// Error for an RPC cut short: the caller's context error if it fired,
    /// otherwise the per-RPC timeout expressed as a transport deadline.
    fn rpc_interrupted(&self, caller_ctx: &Context) -> YdbError {
        caller_ctx.err().unwrap_or_else(|| {
            YdbError::transport(TransportCode::DeadlineExceeded, "request timeout")
        })
    }

    fn maybe_pessimize(&self, err: &YdbError) {
        if err.must_pessimize() {
            self.registry.pessimize(&self.addr);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
