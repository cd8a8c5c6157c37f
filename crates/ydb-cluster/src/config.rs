//! Driver configuration.
//!
//! A [`Config`] is built either programmatically (builder style), from a
//! connection string `grpc[s]://host:port/?database=/path`, or from the
//! environment. All durations default to values that behave on a real
//! cluster; tests shrink them freely.

use crate::credentials::{AccessTokenCredentials, AnonymousCredentials, Credentials};
use crate::error::{Result, YdbError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const ENV_CONNECTION_STRING: &str = "YDB_CONNECTION_STRING";
pub const ENV_SSL_ROOT_CERTIFICATES_FILE: &str = "YDB_SSL_ROOT_CERTIFICATES_FILE";
pub const ENV_ANONYMOUS_CREDENTIALS: &str = "YDB_ANONYMOUS_CREDENTIALS";
pub const ENV_ACCESS_TOKEN_CREDENTIALS: &str = "YDB_ACCESS_TOKEN_CREDENTIALS";
pub const ENV_LOG_SEVERITY_LEVEL: &str = "YDB_LOG_SEVERITY_LEVEL";

/// TLS settings used when the connection string scheme is `grpcs`.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// PEM bundle of trusted roots; system roots are used when absent.
    pub root_ca_file: Option<PathBuf>,
    /// Disables server certificate verification. Test clusters only.
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Seed endpoint `host:port` used for the first discovery round.
    pub endpoint: String,
    pub database: String,
    pub use_tls: bool,
    pub tls: TlsOptions,
    pub credentials: Arc<dyn Credentials>,

    pub dial_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_timeout: Duration,
    pub operation_timeout: Option<Duration>,
    pub operation_cancel_after: Option<Duration>,
    pub discovery_interval: Duration,
    /// How long a banned endpoint stays out of balancing if discovery does
    /// not re-admit it earlier.
    pub ban_cooldown: Duration,

    pub session_pool_size_limit: usize,
    /// Idle sessions kept alive past the idle threshold; negative disables
    /// the floor and every stale idle session is closed.
    pub session_pool_keep_alive_min_size: i64,
    pub session_pool_idle_threshold: Duration,
    pub session_pool_keep_alive_timeout: Duration,
    pub session_pool_create_session_timeout: Duration,

    /// Severity filter requested via `YDB_LOG_SEVERITY_LEVEL`, consumed by
    /// the facade's logging bootstrap.
    pub log_severity: Option<String>,
}

impl Config {
    pub fn new(endpoint: impl Into<String>, database: impl Into<String>) -> Self {
        Config {
            endpoint: endpoint.into(),
            database: database.into(),
            use_tls: false,
            tls: TlsOptions::default(),
            credentials: Arc::new(AnonymousCredentials),
            dial_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(10),
            operation_timeout: None,
            operation_cancel_after: None,
            discovery_interval: Duration::from_secs(60),
            ban_cooldown: Duration::from_secs(60),
            session_pool_size_limit: 50,
            session_pool_keep_alive_min_size: 10,
            session_pool_idle_threshold: Duration::from_secs(300),
            session_pool_keep_alive_timeout: Duration::from_millis(500),
            session_pool_create_session_timeout: Duration::from_secs(5),
            log_severity: None,
        }
    }

    /// Parses `grpc[s]://host:port/?database=/path`.
    pub fn from_connection_string(dsn: &str) -> Result<Self> {
        let url = Url::parse(dsn).map_err(|e| YdbError::Config {
            message: format!("invalid connection string: {e}"),
        })?;
        let use_tls = match url.scheme() {
            "grpc" => false,
            "grpcs" => true,
            other => {
                return Err(invalid_dsn(format!("unsupported scheme {other:?}")));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| invalid_dsn("missing host".to_string()))?;
        let port = url
            .port()
            .ok_or_else(|| invalid_dsn("missing port".to_string()))?;
        let database = url
            .query_pairs()
            .find(|(k, _)| k == "database")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| invalid_dsn("missing database parameter".to_string()))?;

        let mut config = Config::new(format!("{host}:{port}"), database);
        config.use_tls = use_tls;
        Ok(config)
    }

    /// Builds a config from `YDB_CONNECTION_STRING` and the related
    /// environment variables.
    pub fn from_env() -> Result<Self> {
        let dsn = std::env::var(ENV_CONNECTION_STRING).map_err(|_| YdbError::Config {
            message: format!("{ENV_CONNECTION_STRING} is not set"),
        })?;
        let mut config = Config::from_connection_string(&dsn)?;

        if let Ok(path) = std::env::var(ENV_SSL_ROOT_CERTIFICATES_FILE) {
            config.tls.root_ca_file = Some(PathBuf::from(path));
        }
        if let Ok(token) = std::env::var(ENV_ACCESS_TOKEN_CREDENTIALS) {
            config.credentials = Arc::new(AccessTokenCredentials::new(token));
        } else if std::env::var(ENV_ANONYMOUS_CREDENTIALS).is_ok() {
            config.credentials = Arc::new(AnonymousCredentials);
        }
        if let Ok(level) = std::env::var(ENV_LOG_SEVERITY_LEVEL) {
            config.log_severity = Some(level);
        }
        Ok(config)
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.use_tls = true;
        self.tls = tls;
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn with_operation_cancel_after(mut self, cancel_after: Duration) -> Self {
        self.operation_cancel_after = Some(cancel_after);
        self
    }

    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    pub fn with_session_pool_size_limit(mut self, limit: usize) -> Self {
        self.session_pool_size_limit = limit;
        self
    }

    pub fn with_session_pool_keep_alive_min_size(mut self, size: i64) -> Self {
        self.session_pool_keep_alive_min_size = size;
        self
    }

    pub fn with_session_pool_idle_threshold(mut self, threshold: Duration) -> Self {
        self.session_pool_idle_threshold = threshold;
        self
    }

    pub fn with_session_pool_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.session_pool_keep_alive_timeout = timeout;
        self
    }

    pub fn with_session_pool_create_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_pool_create_session_timeout = timeout;
        self
    }
}

fn invalid_dsn(message: String) -> YdbError {
    YdbError::Config {
        message: format!("invalid connection string: {message}"),
    }
}
