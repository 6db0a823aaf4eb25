//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the host application provides: the transport, peer discovery,
//! the application/consensus collaborator, chain head lookup and a clock.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::{
    ChainHead, ConnectionDirection, ConnectionId, P2pMessage, PeerId, Timestamp, TransportError,
};

/// One live bidirectional channel to a peer.
///
/// The core only ever calls these four methods; framing and serialization
/// belong to the implementation.
pub trait Connection: Send + Sync {
    /// Process-unique id of this connection
    fn id(&self) -> ConnectionId;

    /// Queue a message for the peer. Must not block.
    fn send(&self, message: &P2pMessage) -> Result<(), TransportError>;

    /// Close the channel. Idempotent.
    fn close(&self);

    fn is_open(&self) -> bool;
}

/// Shared handle to a transport connection
pub type ConnectionHandle = Arc<dyn Connection>;

/// Connection lifecycle and data events pushed by the transport.
///
/// These replace the `on_open` / `on_data` / `on_close` / `on_error`
/// callbacks: every connection reader pushes into the node's single inbound
/// queue, so all registry mutation happens on one task. For any connection,
/// `Opened` comes first and per-connection order is preserved.
pub enum TransportEvent {
    /// A connection reached the open state
    Opened {
        peer_id: PeerId,
        connection: ConnectionHandle,
        direction: ConnectionDirection,
    },
    /// A frame arrived; validation is the node's job
    Data {
        peer_id: PeerId,
        connection_id: ConnectionId,
        message: Value,
    },
    /// The connection closed cleanly
    Closed {
        peer_id: PeerId,
        connection_id: ConnectionId,
    },
    /// The connection failed
    Error {
        peer_id: PeerId,
        connection_id: ConnectionId,
        reason: String,
    },
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened {
                peer_id,
                connection,
                direction,
            } => f
                .debug_struct("Opened")
                .field("peer_id", peer_id)
                .field("connection_id", &connection.id())
                .field("direction", direction)
                .finish(),
            Self::Data {
                peer_id,
                connection_id,
                message,
            } => f
                .debug_struct("Data")
                .field("peer_id", peer_id)
                .field("connection_id", connection_id)
                .field("message", message)
                .finish(),
            Self::Closed {
                peer_id,
                connection_id,
            } => f
                .debug_struct("Closed")
                .field("peer_id", peer_id)
                .field("connection_id", connection_id)
                .finish(),
            Self::Error {
                peer_id,
                connection_id,
                reason,
            } => f
                .debug_struct("Error")
                .field("peer_id", peer_id)
                .field("connection_id", connection_id)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Sending half of the node's transport event queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<TransportEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<TransportEvent>) -> Self {
        Self { tx }
    }

    /// Create a bounded event queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Push an event, waiting for queue space.
    ///
    /// Fails only once the node has stopped.
    pub async fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// Establishes channels between node identities.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct WebRtcTransport { /* signaling client */ }
///
/// #[async_trait]
/// impl Transport for WebRtcTransport {
///     async fn start(&self, local_id: &PeerId, events: EventSender) -> Result<(), TransportError> {
///         // register with the signaling server, push Opened for inbound peers
///         todo!()
///     }
///     async fn open(&self, peer_id: &PeerId, events: EventSender)
///         -> Result<ConnectionHandle, TransportError> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Initialise the local endpoint and begin accepting inbound peers.
    ///
    /// Inbound connections are reported as `TransportEvent::Opened` with
    /// `ConnectionDirection::Inbound`. Failure here is fatal for the node.
    async fn start(&self, local_id: &PeerId, events: EventSender) -> Result<(), TransportError>;

    /// Dial a peer. Resolves once the connection is open.
    ///
    /// The transport emits `TransportEvent::Opened` with
    /// `ConnectionDirection::Outbound` before any `Data` for the new
    /// connection; the returned handle is informational.
    async fn open(
        &self,
        peer_id: &PeerId,
        events: EventSender,
    ) -> Result<ConnectionHandle, TransportError>;

    /// Stop accepting new connections
    async fn shutdown(&self) {}
}

/// Source of candidate peers, queried once at startup.
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    async fn discover_peers(&self) -> Vec<PeerId>;
}

/// The application/consensus collaborator.
///
/// Receives every message whose business effect the core does not own
/// (peer and chain-state exchange, transactions, candidate blocks,
/// proposals, attestations). Implementations must not block; a returned
/// message is sent back on the same connection.
pub trait ApplicationHandler: Send + Sync {
    fn on_message(&self, from: &PeerId, message: &P2pMessage) -> Option<P2pMessage>;
}

/// Latest block of the local chain, advertised in handshakes
pub trait ChainStateProvider: Send + Sync {
    fn latest_block(&self) -> ChainHead;
}

/// Abstract clock.
///
/// Enables deterministic latency tests by injecting a controllable source.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}
