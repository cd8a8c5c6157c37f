//! Error taxonomy and retry-policy classifier.
//!
//! Every failure the driver can observe is normalized into [`YdbError`]:
//! transport failures carry a [`TransportCode`] (the gRPC-style code space),
//! operation failures carry the server [`StatusCode`] and its issue tree.
//! The classifier methods answer the four policy questions the runtime
//! asks: pessimize the endpoint? close the session? which backoff? retry at
//! all?

use crate::backoff::BackoffKind;
use std::fmt;
use std::sync::Arc;
use ydb_proto::{Issue, Operation, Rejection, StatusCode};

/// Transport-level failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportCode {
    UnknownCode,
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl TransportCode {
    /// Maps a numeric gRPC code to the taxonomy.
    pub fn from_grpc(code: u32) -> Self {
        match code {
            1 => TransportCode::Canceled,
            2 => TransportCode::Unknown,
            3 => TransportCode::InvalidArgument,
            4 => TransportCode::DeadlineExceeded,
            5 => TransportCode::NotFound,
            6 => TransportCode::AlreadyExists,
            7 => TransportCode::PermissionDenied,
            8 => TransportCode::ResourceExhausted,
            9 => TransportCode::FailedPrecondition,
            10 => TransportCode::Aborted,
            11 => TransportCode::OutOfRange,
            12 => TransportCode::Unimplemented,
            13 => TransportCode::Internal,
            14 => TransportCode::Unavailable,
            15 => TransportCode::DataLoss,
            16 => TransportCode::Unauthenticated,
            _ => TransportCode::UnknownCode,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransportCode::UnknownCode => "unknown code",
            TransportCode::Canceled => "canceled",
            TransportCode::Unknown => "unknown",
            TransportCode::InvalidArgument => "invalid argument",
            TransportCode::DeadlineExceeded => "deadline exceeded",
            TransportCode::NotFound => "not found",
            TransportCode::AlreadyExists => "already exists",
            TransportCode::PermissionDenied => "permission denied",
            TransportCode::ResourceExhausted => "resource exhausted",
            TransportCode::FailedPrecondition => "failed precondition",
            TransportCode::Aborted => "aborted",
            TransportCode::OutOfRange => "out of range",
            TransportCode::Unimplemented => "unimplemented",
            TransportCode::Internal => "internal",
            TransportCode::Unavailable => "unavailable",
            TransportCode::DataLoss => "data loss",
            TransportCode::Unauthenticated => "unauthenticated",
        }
    }

    /// Whether an RPC failing with this code must ban its endpoint.
    ///
    /// Resource exhaustion says nothing about endpoint health; every other
    /// code does.
    pub fn must_pessimize(self) -> bool {
        self != TransportCode::ResourceExhausted
    }

    /// Whether the session the RPC ran on can no longer be trusted.
    pub fn must_close_session(self) -> bool {
        !matches!(
            self,
            TransportCode::ResourceExhausted | TransportCode::OutOfRange
        )
    }

    pub fn backoff_kind(self) -> BackoffKind {
        match self {
            TransportCode::Canceled
            | TransportCode::Unknown
            | TransportCode::Internal
            | TransportCode::Unavailable => BackoffKind::Fast,
            TransportCode::ResourceExhausted => BackoffKind::Slow,
            _ => BackoffKind::None,
        }
    }

    /// Whether the server may have executed the operation despite the
    /// transport failure. Such errors are only retried for ops the caller
    /// declared idempotent.
    pub fn completion_undefined(self) -> bool {
        matches!(
            self,
            TransportCode::Canceled
                | TransportCode::Unknown
                | TransportCode::Internal
                | TransportCode::Unavailable
        )
    }

    pub fn retry_allowed(self, idempotent: bool) -> bool {
        match self {
            TransportCode::ResourceExhausted => true,
            code if code.completion_undefined() => idempotent,
            _ => false,
        }
    }
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, cloneable wrapper around an underlying cause.
///
/// The channel fails every in-flight RPC with the same transport error, so
/// the cause has to be shareable; this forwards `Display` and `source` to
/// the wrapped error.
#[derive(Debug, Clone)]
pub struct SharedCause(Arc<dyn std::error::Error + Send + Sync>);

impl SharedCause {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        SharedCause(Arc::new(err))
    }
}

impl fmt::Display for SharedCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for SharedCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Any failure surfaced by the driver.
#[derive(thiserror::Error, Debug, Clone)]
pub enum YdbError {
    #[error("transport error: {code}: {message}")]
    Transport {
        code: TransportCode,
        message: String,
        #[source]
        source: Option<SharedCause>,
    },

    #[error("operation error: {status}{}", DisplayIssues(.issues))]
    Operation {
        status: StatusCode,
        issues: Vec<Issue>,
    },

    #[error("credentials error: {message}")]
    Credentials { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("session pool is closed")]
    PoolClosed,

    #[error("session pool get timed out")]
    PoolTimeout,

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("{cause}: retry attempted {attempts} times, last error: {last_error}")]
    RetryInterrupted {
        attempts: usize,
        last_error: Box<YdbError>,
        #[source]
        cause: Box<YdbError>,
    },
}

struct DisplayIssues<'a>(&'a [Issue]);

impl fmt::Display for DisplayIssues<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ydb_proto::issue::write_issues(f, self.0)
    }
}

impl YdbError {
    pub fn transport(code: TransportCode, message: impl Into<String>) -> Self {
        YdbError::Transport {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn operation(status: StatusCode, issues: Vec<Issue>) -> Self {
        YdbError::Operation { status, issues }
    }

    /// Maps an I/O failure into the transport taxonomy.
    pub fn from_io(err: std::io::Error, context: &str) -> Self {
        use std::io::ErrorKind;
        let code = match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportCode::DeadlineExceeded,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => TransportCode::Unavailable,
            _ => TransportCode::Unknown,
        };
        YdbError::Transport {
            code,
            message: format!("{context}: {err}"),
            source: Some(SharedCause::new(err)),
        }
    }

    /// Maps a transport-level rejection frame.
    pub fn from_rejection(rejection: Rejection) -> Self {
        YdbError::Transport {
            code: TransportCode::from_grpc(rejection.code),
            message: rejection.message,
            source: None,
        }
    }

    /// Converts a non-success operation envelope into an error.
    pub fn from_operation(op: Operation) -> Self {
        YdbError::Operation {
            status: op.status,
            issues: op.issues,
        }
    }

    pub fn is_transport(&self, code: TransportCode) -> bool {
        matches!(self, YdbError::Transport { code: c, .. } if *c == code)
    }

    pub fn is_operation(&self, status: StatusCode) -> bool {
        matches!(self, YdbError::Operation { status: s, .. } if *s == status)
    }

    /// Whether the endpoint that produced this error must be banned.
    pub fn must_pessimize(&self) -> bool {
        match self {
            YdbError::Transport { code, .. } => code.must_pessimize(),
            _ => false,
        }
    }

    /// Whether the session this error was observed on must be closed
    /// instead of returned to the pool.
    pub fn must_close_session(&self) -> bool {
        match self {
            YdbError::Transport { code, .. } => code.must_close_session(),
            YdbError::Operation { status, .. } => matches!(
                status,
                StatusCode::BadSession | StatusCode::SessionExpired | StatusCode::SessionBusy
            ),
            _ => false,
        }
    }

    pub fn backoff_kind(&self) -> BackoffKind {
        match self {
            YdbError::Transport { code, .. } => code.backoff_kind(),
            YdbError::Operation { status, .. } => match status {
                StatusCode::Overloaded => BackoffKind::Slow,
                StatusCode::Aborted
                | StatusCode::Undetermined
                | StatusCode::Unavailable
                | StatusCode::SessionBusy => BackoffKind::Fast,
                _ => BackoffKind::None,
            },
            _ => BackoffKind::None,
        }
    }

    /// Whether the server may have executed the operation anyway.
    pub fn completion_undefined(&self) -> bool {
        match self {
            YdbError::Transport { code, .. } => code.completion_undefined(),
            _ => false,
        }
    }

    /// Whether the retry engine may run the operation again.
    pub fn retry_allowed(&self, idempotent: bool) -> bool {
        match self {
            YdbError::Transport { code, .. } => code.retry_allowed(idempotent),
            YdbError::Operation { status, .. } => matches!(
                status,
                StatusCode::BadSession
                    | StatusCode::SessionExpired
                    | StatusCode::Overloaded
                    | StatusCode::Aborted
                    | StatusCode::Undetermined
                    | StatusCode::Unavailable
                    | StatusCode::SessionBusy
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, YdbError>;
