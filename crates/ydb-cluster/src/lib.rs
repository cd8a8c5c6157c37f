//! Cluster state machine of the ydb driver.
//!
//! This crate owns the data-plane runtime below the session layer:
//!
//! - **Error taxonomy** ([`error`]): every transport and operation failure
//!   normalized into [`YdbError`] with its retry policy.
//! - **Backoff** ([`backoff`]): the fast/slow jittered schedules.
//! - **Context** ([`context`]): deadline + cancellation carrier every wait
//!   point selects against.
//! - **Credentials** ([`credentials`]): token provider collaborators.
//! - **Endpoint registry** ([`endpoint`]): health and load per node,
//!   pessimization, the discovery trigger.
//! - **Connection** ([`conn`], [`channel`]): lazily dialed multiplexed
//!   channel per endpoint, request metadata, deadline plumbing.
//! - **Balancer** ([`balancer`]): load-aware endpoint selection.
//! - **Discovery**: periodic reconciliation against the authoritative
//!   endpoint list.
//! - **Cluster** ([`cluster`]): the composition, exposing `invoke`,
//!   `new_stream` and `close`.
//!
//! # Example
//!
//! ```no_run
//! use ydb_cluster::{Cluster, Config, Context};
//! use ydb_proto::{ListEndpointsRequest, RequestBody};
//!
//! # async fn run() -> Result<(), ydb_cluster::YdbError> {
//! let config = Config::from_connection_string("grpc://localhost:2136/?database=/local")?;
//! let cluster = Cluster::new(config)?;
//! let ctx = Context::background();
//! let payload = cluster
//!     .invoke(&ctx, RequestBody::ListEndpoints(ListEndpointsRequest {
//!         database: "/local".into(),
//!     }))
//!     .await?;
//! # let _ = payload;
//! cluster.close(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod balancer;
pub mod channel;
pub mod cluster;
pub mod config;
pub mod conn;
pub mod context;
pub mod credentials;
mod discovery;
pub mod endpoint;
pub mod error;
pub mod tls;

pub use backoff::{Backoff, BackoffKind};
pub use balancer::Balancer;
pub use cluster::Cluster;
pub use config::{Config, TlsOptions};
pub use conn::Connection;
pub use context::Context;
pub use credentials::{
    AccessTokenCredentials, AnonymousCredentials, Credentials, MultiCredentials,
};
pub use endpoint::{EndpointRecord, EndpointState, Registry};
pub use error::{Result, TransportCode, YdbError};
