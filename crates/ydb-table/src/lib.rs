//! Table layer of the ydb driver.
//!
//! Builds the session-oriented API on top of the cluster runtime:
//!
//! - **Session** ([`session`]): handle to a server-side session, pinned to
//!   the endpoint that created it.
//! - **Session pool** ([`pool`]): bounded idle pool with MRU checkout,
//!   keep-alive sweeps and graceful drain.
//! - **Retry engine** ([`retry`]): drives user closures through checkout,
//!   classification, backoff and re-execution.
//! - **Result scanner** ([`scanner`], [`dest`], [`result`]): typed
//!   decoding of dynamically-typed result sets into caller variables.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ydb_cluster::{Cluster, Config, Context};
//! use ydb_table::{retry, RetryTrace, SessionPool};
//!
//! # async fn run() -> Result<(), ydb_cluster::YdbError> {
//! let config = Config::from_connection_string("grpc://localhost:2136/?database=/local")?;
//! let cluster = Cluster::new(config)?;
//! let pool = SessionPool::new(Arc::clone(&cluster), cluster.config());
//!
//! let ctx = Context::background();
//! retry(pool.as_ref(), &ctx, true, &RetryTrace::default(), |ctx, session| async move {
//!     let result = session.execute_query(&ctx, "SELECT 42 AS answer;").await?;
//!     if let Some(mut reader) = result.into_first() {
//!         while reader.next_row() {
//!             let mut answer: i32 = 0;
//!             let _ = reader.scan((&mut answer,));
//!         }
//!     }
//!     Ok(())
//! })
//! .await?;
//!
//! pool.close(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod dest;
pub mod pool;
pub mod result;
pub mod retry;
pub mod scanner;
pub mod session;
pub mod trace;

pub use dest::{AnyDest, AnyScan, AnyValue, Decimal, RawDest, RawScan, ScanDest, ScanTuple};
pub use pool::SessionPool;
pub use result::{QueryResult, QueryStream};
pub use retry::{retry, SessionProvider};
pub use scanner::{ItemCursor, ResultSetReader, ScanError, ScanErrorKind};
pub use session::Session;
pub use trace::{RetryDoneInfo, RetryTrace};
