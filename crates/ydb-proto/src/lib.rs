//! Wire message layer for the ydb driver.
//!
//! This crate stands in for the generated protocol bindings of the database:
//! plain serde types for the operation envelope, issue tree, typed values and
//! result sets, the session/discovery/query RPC bodies, and the frame codec
//! used by the transport.
//!
//! # Wire model
//!
//! Every unary response carries a generic [`Operation`] envelope:
//! `{ ready, status, issues, result }`. The streaming query RPC instead
//! yields a sequence of [`StreamPart`] messages. Transport-level rejections
//! travel as [`Rejection`] frames carrying a gRPC-style code.
//!
//! # Framing
//!
//! Messages are length-prefixed JSON: `[4-byte length as u32 big-endian] +
//! [JSON data]`, bounded by [`codec::MAX_MESSAGE_SIZE`].

pub mod codec;
pub mod issue;
pub mod operation;
pub mod rpc;
pub mod status;
pub mod value;

pub use codec::{CodecError, MAX_MESSAGE_SIZE};
pub use issue::Issue;
pub use operation::{Operation, OperationMode, OperationParams};
pub use rpc::{
    CreateSessionRequest, CreateSessionResult, DeleteSessionRequest, EndpointInfo,
    ExecuteDataQueryRequest, ExecuteQueryResult, KeepAliveRequest, KeepAliveResult,
    ListEndpointsRequest, ListEndpointsResult, Payload, Rejection, RequestBody, RequestFrame,
    RequestId, ResponseFrame, ResponsePayload, StreamExecuteScanQueryRequest, StreamPart,
};
pub use status::{SessionStatus, StatusCode};
pub use value::{Column, ResultSet, Row, StructMember, Type, Value};
