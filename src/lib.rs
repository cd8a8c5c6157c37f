//! ydb: client driver core for a distributed SQL database.
//!
//! The driver exposes a table-oriented API over a multiplexed RPC transport
//! to a cluster of database nodes. This facade ties the pieces together:
//!
//! - [`ydb_cluster`] (re-exported here): endpoint discovery, per-endpoint
//!   connections, load balancing, pessimization and recovery;
//! - [`ydb_table`] (re-exported here): sessions, the bounded session
//!   pool, the retry engine and the typed result scanner;
//! - [`proto`]: the wire message layer.
//!
//! # Connecting
//!
//! ```no_run
//! use ydb::{Context, Driver};
//!
//! # async fn run() -> Result<(), ydb::YdbError> {
//! let driver = Driver::from_connection_string("grpc://localhost:2136/?database=/local")?;
//!
//! let ctx = Context::background();
//! driver
//!     .retry(&ctx, true, |ctx, session| async move {
//!         let result = session.execute_query(&ctx, "SELECT 1;").await?;
//!         # let _ = result;
//!         Ok(())
//!     })
//!     .await?;
//!
//! driver.close(&ctx).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Environment
//!
//! [`Driver::from_env`] honors `YDB_CONNECTION_STRING`,
//! `YDB_SSL_ROOT_CERTIFICATES_FILE`, `YDB_ANONYMOUS_CREDENTIALS`,
//! `YDB_ACCESS_TOKEN_CREDENTIALS` and `YDB_LOG_SEVERITY_LEVEL`.

use std::future::Future;
use std::sync::Arc;

pub use ydb_proto as proto;

pub use ydb_cluster::{
    AccessTokenCredentials, AnonymousCredentials, Backoff, BackoffKind, Cluster, Config,
    Context, Credentials, EndpointRecord, EndpointState, MultiCredentials, Result, TlsOptions,
    TransportCode, YdbError,
};
pub use ydb_table::{
    retry, AnyDest, AnyScan, AnyValue, Decimal, QueryResult, QueryStream, RawDest, RawScan,
    ResultSetReader, RetryDoneInfo, RetryTrace, ScanDest, ScanError, ScanErrorKind, Session,
    SessionPool, SessionProvider,
};

/// The assembled driver: cluster runtime plus session pool.
pub struct Driver {
    cluster: Arc<Cluster>,
    pool: Arc<SessionPool>,
    trace: RetryTrace,
}

impl Driver {
    /// Builds a driver from an explicit configuration. Must run inside a
    /// tokio runtime (the discovery and keep-alive tasks spawn here).
    pub fn connect(config: Config) -> Result<Driver> {
        let cluster = Cluster::new(config)?;
        let pool = SessionPool::new(Arc::clone(&cluster), cluster.config());
        Ok(Driver {
            cluster,
            pool,
            trace: RetryTrace::default(),
        })
    }

    /// Builds a driver from `grpc[s]://host:port/?database=/path`.
    pub fn from_connection_string(dsn: &str) -> Result<Driver> {
        Driver::connect(Config::from_connection_string(dsn)?)
    }

    /// Builds a driver from the `YDB_*` environment variables.
    pub fn from_env() -> Result<Driver> {
        Driver::connect(Config::from_env()?)
    }

    pub fn with_retry_trace(mut self, trace: RetryTrace) -> Driver {
        self.trace = trace;
        self
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    pub fn session_pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Runs `op` on a pooled session with retries; see [`ydb_table::retry`].
    pub async fn retry<F, Fut>(&self, ctx: &Context, idempotent: bool, op: F) -> Result<()>
    where
        F: FnMut(Context, Session) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        retry(self.pool.as_ref(), ctx, idempotent, &self.trace, op).await
    }

    /// Requests an out-of-band discovery round.
    pub fn force_discovery(&self) {
        self.cluster.force_discovery();
    }

    /// Drains the session pool, then shuts the cluster down. Idempotent.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        let pool_result = self.pool.close(ctx).await;
        let cluster_result = self.cluster.close(ctx).await;
        pool_result.and(cluster_result)
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("cluster", &self.cluster)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Initializes tracing from `YDB_LOG_SEVERITY_LEVEL` (or the config's
/// captured value). Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &Config) {
    let level = config
        .log_severity
        .as_deref()
        .unwrap_or("info")
        .to_ascii_lowercase();
    let filter = match level.as_str() {
        "quiet" => "off",
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" | "fatal" => "error",
        other => other,
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .try_init();
}
