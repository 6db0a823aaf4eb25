//! # TCP Transport
//!
//! Newline-delimited JSON over TCP. A peer id is the `host:port` the peer
//! listens on.
//!
//! ## Wire Protocol
//!
//! - The dialer's first line is an identity frame, `{"peerId":"<host:port>"}`,
//!   so the listener can key the inbound connection by the dialer's
//!   listening address rather than its ephemeral source port.
//! - Every following line is one `{"type": ..., "payload": ...}` message.
//! - A line that is not JSON is passed on as a JSON string, which the node
//!   rejects as malformed.
//! - A line longer than `MAX_FRAME_BYTES` fails the connection.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{ConnectionDirection, ConnectionId, P2pMessage, PeerId, TransportError};
use crate::ports::{Connection, ConnectionHandle, EventSender, Transport, TransportEvent};

/// How long an accepted stream may take to send its identity frame
pub const IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest accepted frame, newline excluded
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

type FrameReader = BufReader<OwnedReadHalf>;

/// Next newline-terminated frame without its line ending; `None` at EOF.
///
/// At most `max + 1` bytes are buffered, so a peer that never sends a
/// newline cannot grow memory past the cap.
async fn read_frame<R>(reader: &mut R, max: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(max as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if read > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame exceeds {} bytes", max),
        ));
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// First line on a dialed stream
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityFrame {
    peer_id: PeerId,
}

// ============================================================================
// TcpConnection
// ============================================================================

/// One TCP stream. Sends are queued to a writer task and never block.
pub struct TcpConnection {
    id: ConnectionId,
    peer_id: PeerId,
    open: AtomicBool,
    outbound: mpsc::UnboundedSender<String>,
    closed: watch::Sender<bool>,
}

impl TcpConnection {
    /// Wrap a connected stream and spawn its reader and writer tasks.
    ///
    /// Emits `Opened` before the reader starts, so the node sees the open
    /// ahead of any data.
    async fn establish(
        peer_id: PeerId,
        direction: ConnectionDirection,
        reader: FrameReader,
        writer: OwnedWriteHalf,
        events: EventSender,
    ) -> Result<Arc<Self>, TransportError> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let connection = Arc::new(Self {
            id: ConnectionId::next(),
            peer_id: peer_id.clone(),
            open: AtomicBool::new(true),
            outbound: outbound_tx,
            closed: closed_tx,
        });

        tokio::spawn(write_loop(writer, outbound_rx, closed_rx.clone()));

        let handle: ConnectionHandle = connection.clone();
        events
            .emit(TransportEvent::Opened {
                peer_id,
                connection: handle,
                direction,
            })
            .await?;

        tokio::spawn(read_loop(connection.clone(), reader, events, closed_rx));
        Ok(connection)
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.closed.send_replace(true);
    }
}

impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: &P2pMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        let mut line =
            serde_json::to_string(message).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        line.push('\n');
        self.outbound
            .send(line)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(peer = %self.peer_id, connection = %self.id, "closing connection");
        }
        self.closed.send_replace(true);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Drain queued lines onto the socket. On close, flush what is already
/// queued (so a final DISCONNECT goes out) and shut the write half.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            line = outbound.recv() => match line {
                Some(line) => {
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        debug!(error = %e, "write failed");
                        return;
                    }
                }
                None => break,
            },
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    break;
                }
            }
        }
    }

    while let Ok(line) = outbound.try_recv() {
        if writer.write_all(line.as_bytes()).await.is_err() {
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Forward inbound lines as `Data` until EOF, an I/O error or local close.
async fn read_loop(
    connection: Arc<TcpConnection>,
    mut reader: FrameReader,
    events: EventSender,
    mut closed: watch::Receiver<bool>,
) {
    let peer_id = connection.peer_id.clone();
    let connection_id = connection.id;

    let terminal = loop {
        tokio::select! {
            next = read_frame(&mut reader, MAX_FRAME_BYTES) => match next {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let message = serde_json::from_str::<Value>(&line)
                        .unwrap_or(Value::String(line));
                    let event = TransportEvent::Data {
                        peer_id: peer_id.clone(),
                        connection_id,
                        message,
                    };
                    if events.emit(event).await.is_err() {
                        break None;
                    }
                }
                Ok(None) => {
                    break Some(TransportEvent::Closed {
                        peer_id: peer_id.clone(),
                        connection_id,
                    })
                }
                Err(e) => {
                    break Some(TransportEvent::Error {
                        peer_id: peer_id.clone(),
                        connection_id,
                        reason: e.to_string(),
                    })
                }
            },
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    break Some(TransportEvent::Closed {
                        peer_id: peer_id.clone(),
                        connection_id,
                    });
                }
            }
        }
    };

    connection.mark_closed();
    if let Some(event) = terminal {
        // The node may already be gone; nothing left to notify.
        let _ = events.emit(event).await;
    }
}

// ============================================================================
// TcpTransport
// ============================================================================

/// TCP implementation of the `Transport` port.
///
/// # Example
///
/// ```rust,ignore
/// use peer_protocol::adapters::TcpTransport;
///
/// let transport = Arc::new(TcpTransport::new());
/// let node = P2pNode::start(config, NodePorts { transport, .. }).await?;
/// ```
#[derive(Default)]
pub struct TcpTransport {
    /// Overrides the address bound by `start` (defaults to the local id)
    bind_addr: Option<String>,
    local_id: Mutex<Option<PeerId>>,
    local_addr: Mutex<Option<SocketAddr>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on `addr` (e.g. `0.0.0.0:7001`) instead of the local id.
    #[must_use]
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    /// Address actually bound, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    async fn accept_loop(listener: TcpListener, events: EventSender) {
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    let events = events.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::accept_stream(stream, events).await {
                            warn!(%remote, error = %e, "rejected inbound stream");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Read the identity frame and hand the stream to the node.
    async fn accept_stream(stream: TcpStream, events: EventSender) -> Result<(), TransportError> {
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let first = tokio::time::timeout(IDENTITY_TIMEOUT, read_frame(&mut reader, MAX_FRAME_BYTES))
            .await
            .map_err(|_| TransportError::Protocol("identity frame timed out".into()))?
            .map_err(|e| TransportError::Protocol(e.to_string()))?
            .ok_or(TransportError::ConnectionClosed)?;
        let identity: IdentityFrame = serde_json::from_str(&first)
            .map_err(|e| TransportError::Protocol(format!("bad identity frame: {}", e)))?;
        if identity.peer_id.is_empty() {
            return Err(TransportError::Protocol("empty identity".into()));
        }

        info!(peer = %identity.peer_id, "accepted inbound connection");
        TcpConnection::establish(
            identity.peer_id,
            ConnectionDirection::Inbound,
            reader,
            writer,
            events,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn start(&self, local_id: &PeerId, events: EventSender) -> Result<(), TransportError> {
        let addr = self
            .bind_addr
            .clone()
            .unwrap_or_else(|| local_id.as_str().to_string());
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::InitFailed(format!("bind {}: {}", addr, e)))?;
        let bound = listener
            .local_addr()
            .map_err(|e| TransportError::InitFailed(e.to_string()))?;

        info!(%bound, peer_id = %local_id, "listening");
        *self.local_id.lock() = Some(local_id.clone());
        *self.local_addr.lock() = Some(bound);
        let task = tokio::spawn(Self::accept_loop(listener, events));
        if let Some(previous) = self.accept_task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn open(
        &self,
        peer_id: &PeerId,
        events: EventSender,
    ) -> Result<ConnectionHandle, TransportError> {
        let local_id = self
            .local_id
            .lock()
            .clone()
            .ok_or(TransportError::NotStarted)?;

        let connect_failed = |reason: String| TransportError::ConnectFailed {
            peer: peer_id.clone(),
            reason,
        };
        let stream = TcpStream::connect(peer_id.as_str())
            .await
            .map_err(|e| connect_failed(e.to_string()))?;
        let (reader, mut writer) = stream.into_split();

        let mut identity = serde_json::to_string(&IdentityFrame { peer_id: local_id })
            .map_err(|e| connect_failed(e.to_string()))?;
        identity.push('\n');
        writer
            .write_all(identity.as_bytes())
            .await
            .map_err(|e| connect_failed(e.to_string()))?;

        let connection = TcpConnection::establish(
            peer_id.clone(),
            ConnectionDirection::Outbound,
            BufReader::new(reader),
            writer,
            events,
        )
        .await?;
        let handle: ConnectionHandle = connection;
        Ok(handle)
    }

    async fn shutdown(&self) {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
            info!("listener stopped");
        }
    }
}
