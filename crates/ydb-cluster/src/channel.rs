//! Multiplexed transport channel.
//!
//! One channel owns one TCP (optionally TLS) stream to one endpoint and is
//! shared by every RPC routed there. Concurrent unary calls and streams are
//! multiplexed by request id: the writer half sits behind an async mutex,
//! a background reader task routes response frames to per-request slots.
//! A broken read fails every in-flight RPC with the same transport error
//! and marks the channel dead; the owning connection re-dials lazily.
//!
//! Wire format: `[4-byte length as u32 big-endian] + [JSON frame]`.

use crate::context::Context;
use crate::error::{Result, TransportCode, YdbError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;
use ydb_proto::{codec, RequestFrame, RequestId, ResponseFrame, ResponsePayload, StreamPart};

pub(crate) trait Io: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

enum Slot {
    Unary(oneshot::Sender<Result<ResponsePayload>>),
    Stream(mpsc::UnboundedSender<Result<StreamPart>>),
}

struct Pending {
    slots: HashMap<RequestId, Slot>,
    /// Set once the channel is unusable; the error every later caller gets.
    broken: Option<YdbError>,
}

pub struct Channel {
    addr: String,
    writer: Mutex<WriteHalf<Box<dyn Io>>>,
    pending: Arc<StdMutex<Pending>>,
    reader: JoinHandle<()>,
}

impl Channel {
    /// Dials `addr` (TLS when `tls` is set) and starts the reader task.
    /// The dial itself races `ctx`.
    pub async fn connect(
        ctx: &Context,
        addr: &str,
        tls: Option<Arc<rustls::ClientConfig>>,
    ) -> Result<Channel> {
        let io = tokio::select! {
            io = dial(addr, tls) => io?,
            _ = ctx.done() => return Err(ctx.err().unwrap_or(YdbError::Canceled)),
        };

        let (read_half, write_half) = tokio::io::split(io);
        let pending = Arc::new(StdMutex::new(Pending {
            slots: HashMap::new(),
            broken: None,
        }));
        let reader = tokio::spawn(reader_loop(
            addr.to_string(),
            read_half,
            Arc::clone(&pending),
        ));
        debug!(endpoint = addr, "channel established");

        Ok(Channel {
            addr: addr.to_string(),
            writer: Mutex::new(write_half),
            pending,
            reader,
        })
    }

    pub fn is_broken(&self) -> bool {
        self.pending.lock().unwrap().broken.is_some()
    }

    /// Sends one request and resolves with its response payload.
    pub async fn invoke(&self, frame: RequestFrame) -> Result<ResponsePayload> {
        let (tx, rx) = oneshot::channel();
        self.register(frame.id, Slot::Unary(tx))?;
        if let Err(err) = self.send(&frame).await {
            self.pending.lock().unwrap().slots.remove(&frame.id);
            return Err(err);
        }
        match rx.await {
            Ok(result) => result,
            // Reader gone without delivering: channel torn down.
            Err(_) => Err(self.broken_error()),
        }
    }

    /// Sends one request and returns the receiver of its stream parts.
    pub async fn new_stream(
        &self,
        frame: RequestFrame,
    ) -> Result<mpsc::UnboundedReceiver<Result<StreamPart>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(frame.id, Slot::Stream(tx))?;
        if let Err(err) = self.send(&frame).await {
            self.pending.lock().unwrap().slots.remove(&frame.id);
            return Err(err);
        }
        Ok(rx)
    }

    /// Tears the channel down, failing all in-flight RPCs.
    pub async fn close(&self) {
        fail_all(
            &self.pending,
            YdbError::transport(TransportCode::Canceled, "channel closed"),
        );
        self.reader.abort();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        debug!(endpoint = %self.addr, "channel closed");
    }

    fn register(&self, id: RequestId, slot: Slot) -> Result<()> {
        let mut pending = self.pending.lock().unwrap();
        if let Some(broken) = &pending.broken {
            return Err(broken.clone());
        }
        pending.slots.insert(id, slot);
        Ok(())
    }

    async fn send(&self, frame: &RequestFrame) -> Result<()> {
        let data = codec::encode_request(frame).map_err(|e| YdbError::Transport {
            code: TransportCode::Internal,
            message: format!("encoding request: {e}"),
            source: None,
        })?;
        let mut writer = self.writer.lock().await;
        let result = write_message(&mut *writer, &data).await;
        if let Err(err) = &result {
            // A failed write poisons the stream for everyone.
            fail_all(&self.pending, err.clone());
        }
        result
    }

    fn broken_error(&self) -> YdbError {
        self.pending
            .lock()
            .unwrap()
            .broken
            .clone()
            .unwrap_or_else(|| {
                YdbError::transport(TransportCode::Unavailable, "channel torn down")
            })
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn dial(addr: &str, tls: Option<Arc<rustls::ClientConfig>>) -> Result<Box<dyn Io>> {
    let tcp = TcpStream::connect(addr)
        .await
        .map_err(|e| YdbError::from_io(e, "dialing"))?;
    tcp.set_nodelay(true)
        .map_err(|e| YdbError::from_io(e, "configuring socket"))?;
    match tls {
        None => Ok(Box::new(tcp)),
        Some(config) => {
            let host = addr.rsplit_once(':').map(|(h, _)| h).unwrap_or(addr);
            let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
                .map_err(|e| {
                    YdbError::transport(
                        TransportCode::Unavailable,
                        format!("invalid server name {host:?}: {e}"),
                    )
                })?;
            let connector = tokio_rustls::TlsConnector::from(config);
            let stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| YdbError::from_io(e, "TLS handshake"))?;
            Ok(Box::new(stream))
        }
    }
}

async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
    writer
        .write_all(&(data.len() as u32).to_be_bytes())
        .await
        .map_err(|e| YdbError::from_io(e, "writing length prefix"))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| YdbError::from_io(e, "writing frame"))?;
    writer
        .flush()
        .await
        .map_err(|e| YdbError::from_io(e, "flushing frame"))?;
    Ok(())
}

async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| YdbError::from_io(e, "reading length prefix"))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > codec::MAX_MESSAGE_SIZE {
        return Err(YdbError::transport(
            TransportCode::Internal,
            format!("message too large: {len} bytes"),
        ));
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| YdbError::from_io(e, "reading frame"))?;
    Ok(buf)
}

async fn reader_loop(
    addr: String,
    mut read_half: ReadHalf<Box<dyn Io>>,
    pending: Arc<StdMutex<Pending>>,
) {
    loop {
        let frame = match read_message(&mut read_half).await {
            Ok(data) => match codec::decode_response(&data) {
                Ok(frame) => frame,
                Err(e) => {
                    let err = YdbError::transport(
                        TransportCode::Internal,
                        format!("decoding response: {e}"),
                    );
                    debug!(endpoint = %addr, error = %err, "channel read failed");
                    fail_all(&pending, err);
                    return;
                }
            },
            Err(err) => {
                debug!(endpoint = %addr, error = %err, "channel read failed");
                fail_all(&pending, err);
                return;
            }
        };
        dispatch(&pending, frame);
    }
}

fn dispatch(pending: &StdMutex<Pending>, frame: ResponseFrame) {
    let ResponseFrame { id, payload } = frame;
    let mut guard = pending.lock().unwrap();
    // Late responses to abandoned requests fall through silently.
    let Some(slot) = guard.slots.remove(&id) else {
        return;
    };
    match slot {
        Slot::Unary(tx) => {
            let _ = tx.send(Ok(payload));
        }
        Slot::Stream(tx) => match payload {
            ResponsePayload::StreamPart(part) => {
                let done = part.done;
                let delivered = tx.send(Ok(part)).is_ok();
                if !done && delivered {
                    guard.slots.insert(id, Slot::Stream(tx));
                }
            }
            ResponsePayload::Rejected(rejection) => {
                let _ = tx.send(Err(YdbError::from_rejection(rejection)));
            }
            ResponsePayload::Operation(_) => {
                let _ = tx.send(Err(YdbError::transport(
                    TransportCode::Internal,
                    "unary response on a streaming request",
                )));
            }
        },
    }
}

fn fail_all(pending: &StdMutex<Pending>, err: YdbError) {
    let slots = {
        let mut guard = pending.lock().unwrap();
        if guard.broken.is_none() {
            guard.broken = Some(err.clone());
        }
        std::mem::take(&mut guard.slots)
    };
    for (_, slot) in slots {
        match slot {
            Slot::Unary(tx) => {
                let _ = tx.send(Err(err.clone()));
            }
            Slot::Stream(tx) => {
                let _ = tx.send(Err(err.clone()));
            }
        }
    }
}
