//! RPC bodies and the request/response frames of the transport.

use crate::issue::Issue;
use crate::operation::{Operation, OperationParams};
use crate::status::{SessionStatus, StatusCode};
use crate::value::ResultSet;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Unique identifier correlating a response frame with its request.
pub type RequestId = u64;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a unique request id: upper 32 bits are seconds since the UNIX
/// epoch, lower 32 bits an atomic counter. Unique across restarts and
/// within the same runtime.
pub fn next_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    (timestamp << 32) | (counter & 0xFFFF_FFFF)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionResult {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAliveRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAliveResult {
    pub session_status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteDataQueryRequest {
    pub session_id: String,
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteQueryResult {
    pub result_sets: Vec<ResultSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEndpointsRequest {
    pub database: String,
}

/// One cluster node as reported by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub load_factor: f32,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
}

impl EndpointInfo {
    /// `host:port` form used as the registry key.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListEndpointsResult {
    pub endpoints: Vec<EndpointInfo>,
    #[serde(default)]
    pub self_location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamExecuteScanQueryRequest {
    pub query: String,
}

/// RPC-specific result payload inside an [`Operation`] envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    CreateSession(CreateSessionResult),
    KeepAlive(KeepAliveResult),
    ExecuteQuery(ExecuteQueryResult),
    ListEndpoints(ListEndpointsResult),
}

/// Request bodies the cluster understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    CreateSession(CreateSessionRequest),
    DeleteSession(DeleteSessionRequest),
    KeepAlive(KeepAliveRequest),
    ExecuteDataQuery(ExecuteDataQueryRequest),
    ListEndpoints(ListEndpointsRequest),
    StreamExecuteScanQuery(StreamExecuteScanQueryRequest),
}

impl RequestBody {
    /// Method name used in logs and traces.
    pub fn method(&self) -> &'static str {
        match self {
            RequestBody::CreateSession(_) => "CreateSession",
            RequestBody::DeleteSession(_) => "DeleteSession",
            RequestBody::KeepAlive(_) => "KeepAlive",
            RequestBody::ExecuteDataQuery(_) => "ExecuteDataQuery",
            RequestBody::ListEndpoints(_) => "ListEndpoints",
            RequestBody::StreamExecuteScanQuery(_) => "StreamExecuteScanQuery",
        }
    }

    /// True for the server-streaming variant.
    pub fn is_stream(&self) -> bool {
        matches!(self, RequestBody::StreamExecuteScanQuery(_))
    }
}

/// One request on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: RequestId,
    /// Authentication token metadata; absent for anonymous credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_params: Option<OperationParams>,
    pub body: RequestBody,
}

impl RequestFrame {
    pub fn new(body: RequestBody) -> Self {
        RequestFrame {
            id: next_request_id(),
            auth_token: None,
            operation_params: None,
            body,
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn with_operation_params(mut self, params: OperationParams) -> Self {
        self.operation_params = Some(params);
        self
    }
}

/// One message of the streaming query RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPart {
    pub status: StatusCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_set: Option<ResultSet>,
    /// Set on the final part of the stream.
    #[serde(default)]
    pub done: bool,
}

/// Transport-level rejection, carrying a gRPC-style status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    Operation(Operation),
    StreamPart(StreamPart),
    Rejected(Rejection),
}

/// One response on the wire, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: RequestId,
    pub payload: ResponsePayload,
}
