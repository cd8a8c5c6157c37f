//! Cluster composition.
//!
//! Ties the registry, balancer, connections and the discovery loop into the
//! single object the rest of the driver talks to. RPC routing is
//! `balancer pick → connection → invoke`; callers that need endpoint
//! affinity (sessions) keep the returned [`Connection`] handle and issue
//! their later RPCs on it directly.

use crate::balancer::Balancer;
use crate::config::Config;
use crate::conn::Connection;
use crate::context::Context;
use crate::discovery;
use crate::endpoint::Registry;
use crate::error::{Result, TransportCode, YdbError};
use crate::tls;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ydb_proto::{
    EndpointInfo, ListEndpointsRequest, Payload, RequestBody, StreamPart,
};

pub struct Cluster {
    config: Arc<Config>,
    registry: Arc<Registry>,
    balancer: Balancer,
    tls: Option<Arc<rustls::ClientConfig>>,
    conns: StdMutex<HashMap<String, Arc<Connection>>>,
    discovery_cancel: CancellationToken,
    discovery_task: StdMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Cluster {
    /// Builds the cluster around the configured seed endpoint and starts
    /// the discovery task. Must run inside a tokio runtime.
    pub fn new(config: Config) -> Result<Arc<Cluster>> {
        let config = Arc::new(config);
        let tls = if config.use_tls {
            Some(tls::client_config(&config.tls)?)
        } else {
            None
        };

        let registry = Arc::new(Registry::new());
        registry.add(&config.endpoint, 0.0);

        let cluster = Arc::new(Cluster {
            balancer: Balancer::new(config.ban_cooldown),
            config,
            registry,
            tls,
            conns: StdMutex::new(HashMap::new()),
            discovery_cancel: CancellationToken::new(),
            discovery_task: StdMutex::new(None),
            closed: AtomicBool::new(false),
        });

        let task = tokio::spawn(discovery::run(
            Arc::downgrade(&cluster),
            cluster.discovery_cancel.clone(),
        ));
        *cluster.discovery_task.lock().unwrap() = Some(task);
        Ok(cluster)
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Picks an endpoint and returns its shared connection, creating the
    /// connection object lazily (the dial itself happens on first RPC).
    pub fn connection(&self) -> Result<Arc<Connection>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(YdbError::transport(
                TransportCode::Unavailable,
                "cluster is closed",
            ));
        }
        let snapshot = self.registry.snapshot();
        let picked = self.balancer.pick(&snapshot).ok_or_else(|| {
            YdbError::transport(TransportCode::Unavailable, "no known endpoints")
        })?;
        Ok(self.connection_to(&picked.addr))
    }

    /// Unary RPC through a freshly balanced endpoint.
    pub async fn invoke(&self, ctx: &Context, body: RequestBody) -> Result<Option<Payload>> {
        self.connection()?.invoke(ctx, body).await
    }

    /// Streaming RPC through a freshly balanced endpoint.
    pub async fn new_stream(
        &self,
        ctx: &Context,
        body: RequestBody,
    ) -> Result<mpsc::UnboundedReceiver<Result<StreamPart>>> {
        self.connection()?.new_stream(ctx, body).await
    }

    /// Requests an out-of-band discovery round.
    pub fn force_discovery(&self) {
        self.registry.request_discovery();
    }

    /// Stops discovery and closes every connection. Idempotent. The lock
    /// order is fixed: discovery stop, then registry write, then
    /// per-connection close.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("closing cluster");

        self.discovery_cancel.cancel();
        let task = self.discovery_task.lock().unwrap().take();
        if let Some(task) = task {
            tokio::select! {
                _ = task => {}
                _ = ctx.done() => {}
            }
        }

        self.registry.destroy_all();

        let conns: Vec<Arc<Connection>> =
            self.conns.lock().unwrap().drain().map(|(_, c)| c).collect();
        for conn in conns {
            tokio::select! {
                _ = conn.close() => {}
                _ = ctx.done() => return Err(ctx.err().unwrap_or(YdbError::Canceled)),
            }
        }
        Ok(())
    }

    /// One discovery round: fetch the endpoint list and reconcile the
    /// registry with it. Returns (added, removed) counts.
    pub async fn discover_once(&self, ctx: &Context) -> Result<(usize, usize)> {
        let payload = self
            .invoke(
                ctx,
                RequestBody::ListEndpoints(ListEndpointsRequest {
                    database: self.config.database.clone(),
                }),
            )
            .await?;
        match payload {
            Some(Payload::ListEndpoints(result)) => Ok(self.reconcile(result.endpoints)),
            _ => Err(YdbError::transport(
                TransportCode::Internal,
                "unexpected ListEndpoints payload",
            )),
        }
    }

    /// Applies an authoritative endpoint list: add new endpoints, refresh
    /// load scores, re-admit banned endpoints the cluster still reports,
    /// and retire endpoints that disappeared. Retired connections are not
    /// torn down; in-flight RPCs on them finish normally.
    pub fn reconcile(&self, endpoints: Vec<EndpointInfo>) -> (usize, usize) {
        let fresh: HashMap<String, f32> = endpoints
            .into_iter()
            .map(|e| (e.addr(), e.load_factor))
            .collect();

        let mut added = 0;
        let mut removed = 0;

        for record in self.registry.snapshot() {
            if fresh.contains_key(&record.addr) {
                if record.state == crate::endpoint::EndpointState::Banned {
                    self.registry.admit(&record.addr);
                }
            } else {
                self.registry.remove(&record.addr);
                removed += 1;
                let conn = self.conns.lock().unwrap().remove(&record.addr);
                if let Some(conn) = conn {
                    debug!(endpoint = %record.addr, "retiring connection");
                    conn.retire();
                }
            }
        }

        for (addr, load_factor) in fresh {
            if !self.registry.contains(&addr) {
                added += 1;
            }
            self.registry.add(&addr, load_factor);
        }

        (added, removed)
    }

    fn connection_to(&self, addr: &str) -> Arc<Connection> {
        let mut conns = self.conns.lock().unwrap();
        Arc::clone(conns.entry(addr.to_string()).or_insert_with(|| {
            Arc::new(Connection::new(
                addr.to_string(),
                Arc::clone(&self.config),
                Arc::clone(&self.registry),
                self.tls.clone(),
            ))
        }))
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("endpoints", &self.registry.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
