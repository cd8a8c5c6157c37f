//! In-process mock database node for integration tests.
//!
//! Speaks the real frame protocol over TCP. Built-in handlers cover the
//! session and discovery RPCs with bookkeeping the tests assert against;
//! a per-server hook can override any request with a scripted reaction.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use ydb_proto::{
    codec, CreateSessionResult, EndpointInfo, ExecuteQueryResult, KeepAliveResult,
    ListEndpointsResult, Operation, Payload, Rejection, RequestBody, RequestFrame,
    ResponseFrame, ResponsePayload, SessionStatus, StatusCode, StreamPart,
};

/// Scripted answer to one request.
pub enum Reaction {
    Operation(Operation),
    Reject { code: u32, message: String },
    Stream(Vec<StreamPart>),
    /// Close the TCP connection without answering.
    Hangup,
    /// Never answer, keep the connection open.
    Ignore,
    Delayed(Duration, Box<Reaction>),
}

impl Reaction {
    pub fn failure(status: StatusCode) -> Reaction {
        Reaction::Operation(Operation::failure(status, vec![]))
    }

    pub fn reject(code: u32, message: &str) -> Reaction {
        Reaction::Reject {
            code,
            message: message.to_string(),
        }
    }
}

pub type Hook = Arc<dyn Fn(&RequestFrame) -> Option<Reaction> + Send + Sync>;

#[derive(Default)]
pub struct ServerStats {
    session_counter: AtomicUsize,
    pub created: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub keepalives: AtomicUsize,
    pub executes: AtomicUsize,
    pub last_auth_token: Mutex<Option<String>>,
}

impl ServerStats {
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.lock().unwrap().len()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn keepalive_count(&self) -> usize {
        self.keepalives.load(Ordering::SeqCst)
    }

    pub fn execute_count(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }
}

pub struct MockServer {
    addr: String,
    port: u16,
    stats: Arc<ServerStats>,
    endpoints: Arc<Mutex<Option<Vec<EndpointInfo>>>>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> MockServer {
        MockServer::start_with_hook(None).await
    }

    pub async fn start_with(hook: impl Fn(&RequestFrame) -> Option<Reaction> + Send + Sync + 'static) -> MockServer {
        MockServer::start_with_hook(Some(Arc::new(hook))).await
    }

    async fn start_with_hook(hook: Option<Hook>) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let stats = Arc::new(ServerStats::default());
        let endpoints = Arc::new(Mutex::new(None));

        let accept_stats = Arc::clone(&stats);
        let accept_endpoints = Arc::clone(&endpoints);
        let self_endpoint = EndpointInfo {
            address: "127.0.0.1".to_string(),
            port: local.port(),
            load_factor: 0.0,
            ssl: false,
            services: vec![],
        };
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve_connection(
                    socket,
                    Arc::clone(&accept_stats),
                    Arc::clone(&accept_endpoints),
                    self_endpoint.clone(),
                    hook.clone(),
                ));
            }
        });

        MockServer {
            addr: local.to_string(),
            port: local.port(),
            stats,
            endpoints,
            accept_task,
        }
    }

    /// `host:port` of the listener.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint_info(&self) -> EndpointInfo {
        EndpointInfo {
            address: "127.0.0.1".to_string(),
            port: self.port,
            load_factor: 0.0,
            ssl: false,
            services: vec![],
        }
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Overrides what ListEndpoints reports (default: this server only).
    pub fn set_endpoints(&self, endpoints: Vec<EndpointInfo>) {
        *self.endpoints.lock().unwrap() = Some(endpoints);
    }

    /// Stops accepting new connections.
    pub fn stop_accepting(&self) {
        self.accept_task.abort();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(
    socket: TcpStream,
    stats: Arc<ServerStats>,
    endpoints: Arc<Mutex<Option<Vec<EndpointInfo>>>>,
    self_endpoint: EndpointInfo,
    hook: Option<Hook>,
) {
    let (mut reader, writer) = socket.into_split();
    let writer = Arc::new(tokio::sync::Mutex::new(writer));

    loop {
        let Ok(data) = read_message(&mut reader).await else {
            return;
        };
        let Ok(frame) = codec::decode_request(&data) else {
            return;
        };
        *stats.last_auth_token.lock().unwrap() = frame.auth_token.clone();

        let reaction = hook
            .as_ref()
            .and_then(|hook| hook(&frame))
            .unwrap_or_else(|| builtin_reaction(&frame, &stats, &endpoints, &self_endpoint));

        let writer = Arc::clone(&writer);
        let id = frame.id;
        tokio::spawn(async move {
            apply_reaction(writer, id, reaction).await;
        });
    }
}

fn builtin_reaction(
    frame: &RequestFrame,
    stats: &ServerStats,
    endpoints: &Mutex<Option<Vec<EndpointInfo>>>,
    self_endpoint: &EndpointInfo,
) -> Reaction {
    match &frame.body {
        RequestBody::CreateSession(_) => {
            let n = stats.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("session-{n}");
            stats.created.lock().unwrap().push(id.clone());
            let active = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
            stats.max_active.fetch_max(active, Ordering::SeqCst);
            Reaction::Operation(Operation::success(Payload::CreateSession(
                CreateSessionResult { session_id: id },
            )))
        }
        RequestBody::DeleteSession(req) => {
            stats.deleted.lock().unwrap().push(req.session_id.clone());
            stats.active.fetch_sub(1, Ordering::SeqCst);
            Reaction::Operation(Operation::success_empty())
        }
        RequestBody::KeepAlive(_) => {
            stats.keepalives.fetch_add(1, Ordering::SeqCst);
            Reaction::Operation(Operation::success(Payload::KeepAlive(KeepAliveResult {
                session_status: SessionStatus::Ready,
            })))
        }
        RequestBody::ExecuteDataQuery(_) => {
            stats.executes.fetch_add(1, Ordering::SeqCst);
            Reaction::Operation(Operation::success(Payload::ExecuteQuery(
                ExecuteQueryResult::default(),
            )))
        }
        RequestBody::ListEndpoints(_) => {
            let list = endpoints
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| vec![self_endpoint.clone()]);
            Reaction::Operation(Operation::success(Payload::ListEndpoints(
                ListEndpointsResult {
                    endpoints: list,
                    self_location: "dc-1".to_string(),
                },
            )))
        }
        RequestBody::StreamExecuteScanQuery(_) => Reaction::Stream(vec![StreamPart {
            status: StatusCode::Success,
            issues: vec![],
            result_set: None,
            done: true,
        }]),
    }
}

async fn apply_reaction(
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    id: u64,
    reaction: Reaction,
) {
    match reaction {
        Reaction::Operation(op) => {
            respond(&writer, id, ResponsePayload::Operation(op)).await;
        }
        Reaction::Reject { code, message } => {
            respond(
                &writer,
                id,
                ResponsePayload::Rejected(Rejection { code, message }),
            )
            .await;
        }
        Reaction::Stream(parts) => {
            for part in parts {
                respond(&writer, id, ResponsePayload::StreamPart(part)).await;
            }
        }
        Reaction::Hangup => {
            let mut writer = writer.lock().await;
            let _ = writer.shutdown().await;
        }
        Reaction::Ignore => {}
        Reaction::Delayed(delay, inner) => {
            tokio::time::sleep(delay).await;
            Box::pin(apply_reaction(writer, id, *inner)).await;
        }
    }
}

async fn respond(
    writer: &Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    id: u64,
    payload: ResponsePayload,
) {
    let frame = ResponseFrame { id, payload };
    let data = codec::encode_response(&frame).unwrap();
    let mut writer = writer.lock().await;
    let _ = writer.write_all(&(data.len() as u32).to_be_bytes()).await;
    let _ = writer.write_all(&data).await;
    let _ = writer.flush().await;
}

async fn read_message(reader: &mut (impl AsyncReadExt + Unpin)) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Result set fixture: one `Optional<Uint32>` column.
pub fn optional_u32_result_set(values: &[Option<u32>]) -> ydb_proto::ResultSet {
    ydb_proto::ResultSet {
        columns: vec![ydb_proto::Column {
            name: "value".to_string(),
            ty: ydb_proto::Type::optional(ydb_proto::Type::Uint32),
        }],
        rows: values
            .iter()
            .map(|v| ydb_proto::Row {
                items: vec![match v {
                    Some(v) => ydb_proto::Value::Uint32(*v),
                    None => ydb_proto::Value::Null,
                }],
            })
            .collect(),
        truncated: false,
    }
}

/// Driver config pointed at a mock server, with test-friendly timings.
pub fn test_config(addr: &str) -> ydb::Config {
    ydb::Config::new(addr, "/test")
        .with_dial_timeout(Duration::from_secs(1))
        .with_request_timeout(Duration::from_secs(2))
        .with_discovery_interval(Duration::from_secs(3600))
        .with_session_pool_create_session_timeout(Duration::from_secs(2))
}
