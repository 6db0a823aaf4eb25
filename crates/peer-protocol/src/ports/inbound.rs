//! # Driving Ports (Inbound API)
//!
//! The API the application layer uses to talk to a running node.

use async_trait::async_trait;

use crate::domain::{NodeError, P2pMessage, PeerId, PeerSummary, RegistryStats};

/// Outcome of one fan-out.
///
/// Broadcast is fire-and-forget; this only says which sends were attempted
/// while the connection looked open, and which failed (and were dropped).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers whose connection accepted the message
    pub delivered: Vec<PeerId>,
    /// Peers whose send failed; their records were removed
    pub failed: Vec<PeerId>,
}

impl BroadcastReport {
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }
}

/// Primary API of a running node.
///
/// # Example
///
/// ```rust,ignore
/// use peer_protocol::ports::PeerNetworkApi;
///
/// async fn relay<N: PeerNetworkApi>(node: &N, tx: P2pMessage) {
///     let report = node.broadcast(tx).await?;
///     tracing::info!(delivered = report.delivered_count(), "relayed");
/// }
/// ```
#[async_trait]
pub trait PeerNetworkApi: Send + Sync {
    /// Send to every compatible, open connection.
    async fn broadcast(&self, message: P2pMessage) -> Result<BroadcastReport, NodeError>;

    /// Send to one peer regardless of compatibility.
    ///
    /// A failed send drops the peer's record, as in broadcast.
    async fn send_to(&self, peer_id: PeerId, message: P2pMessage) -> Result<(), NodeError>;

    /// Send a PING with a fresh nonce, returning the nonce.
    async fn ping(&self, peer_id: PeerId) -> Result<String, NodeError>;

    /// Dial a peer; the handshake starts once it opens.
    async fn connect(&self, peer_id: PeerId) -> Result<(), NodeError>;

    /// Send DISCONNECT, close and forget the peer.
    async fn disconnect(&self, peer_id: PeerId, reason: String) -> Result<(), NodeError>;

    /// Snapshot of every registry record
    async fn peers(&self) -> Result<Vec<PeerSummary>, NodeError>;

    /// Ids of the current broadcast set
    async fn compatible_peers(&self) -> Result<Vec<PeerId>, NodeError>;

    async fn stats(&self) -> Result<RegistryStats, NodeError>;

    /// Mark local proposal work as started/finished.
    fn set_proposing_block(&self, proposing: bool);

    fn is_proposing_block(&self) -> bool;

    /// Say goodbye to every peer and stop the node.
    async fn stop(&self) -> Result<(), NodeError>;
}
