//! Node state and connection lifecycle handling.
//!
//! ## Replaced connections
//!
//! A second `Opened` for a known peer replaces its record. The superseded
//! connection is not closed here, because in a simultaneous dial each side
//! would close the channel the other side kept. From then on it is
//! untracked: its frames, close and error events are ignored, and the socket
//! stays open until the peer closes it or the transport shuts down.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{
    ConnectionDirection, ConnectionId, ConnectionRecord, ConnectionRegistry, DisconnectPayload,
    NodeConfig, NodeError, P2pMessage, PeerId, ProposalFlag, Timestamp,
};
use crate::ports::{
    ApplicationHandler, ChainStateProvider, ConnectionHandle, EventSender, PeerDiscovery,
    TimeSource, Transport, TransportEvent,
};

/// The host-provided collaborators a node runs against.
#[derive(Clone)]
pub struct NodePorts {
    pub transport: Arc<dyn Transport>,
    pub discovery: Arc<dyn PeerDiscovery>,
    pub application: Arc<dyn ApplicationHandler>,
    pub chain_state: Arc<dyn ChainStateProvider>,
    pub time_source: Arc<dyn TimeSource>,
}

/// Protocol state machine of one node.
///
/// Owns the connection registry. Every mutation goes through `&mut self`,
/// and in a running node only the actor task holds the `P2pNode`, so
/// handshake updates, removals and broadcast snapshots never race.
pub struct P2pNode {
    pub(crate) config: NodeConfig,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) proposal: ProposalFlag,
    pub(crate) ports: NodePorts,
    pub(crate) events: EventSender,
}

impl P2pNode {
    /// Create a node that has not started its transport.
    ///
    /// `events` is the sender half handed to the transport; the node keeps a
    /// clone for the dial tasks it spawns.
    pub fn new(config: NodeConfig, ports: NodePorts, events: EventSender) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            proposal: ProposalFlag::new(),
            ports,
            events,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn local_id(&self) -> &PeerId {
        &self.config.peer_id
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Shared proposal flag (clones observe the same state)
    pub fn proposal_flag(&self) -> &ProposalFlag {
        &self.proposal
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.ports.time_source.now()
    }

    // =========================================================================
    // TRANSPORT EVENTS
    // =========================================================================

    /// Apply one transport event to the registry.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened {
                peer_id,
                connection,
                direction,
            } => self.on_connection_opened(peer_id, connection, direction),
            TransportEvent::Data {
                peer_id,
                connection_id,
                message,
            } => self.on_data(&peer_id, connection_id, message),
            TransportEvent::Closed {
                peer_id,
                connection_id,
            } => self.on_connection_closed(&peer_id, connection_id),
            TransportEvent::Error {
                peer_id,
                connection_id,
                reason,
            } => self.on_connection_error(&peer_id, connection_id, &reason),
        }
    }

    fn on_connection_opened(
        &mut self,
        peer_id: PeerId,
        connection: ConnectionHandle,
        direction: ConnectionDirection,
    ) {
        if peer_id == self.config.peer_id {
            warn!(peer = %peer_id, "closing connection to own identity");
            connection.close();
            return;
        }

        let connection_id = connection.id();
        let record = ConnectionRecord::new(peer_id.clone(), connection, direction, self.now());

        // Left open and untracked; see the module docs.
        if let Some(replaced) = self.registry.upsert(record) {
            info!(
                peer = %peer_id,
                old = %replaced.connection_id(),
                new = %connection_id,
                "replaced existing connection record"
            );
        }

        info!(peer = %peer_id, connection = %connection_id, ?direction, "connection opened");

        if direction == ConnectionDirection::Outbound {
            self.send_hello(&peer_id);
        }
    }

    fn on_connection_closed(&mut self, peer_id: &PeerId, connection_id: ConnectionId) {
        if !self.is_current(peer_id, connection_id) {
            debug!(peer = %peer_id, connection = %connection_id, "ignoring close of superseded connection");
            return;
        }
        self.registry.remove(peer_id);
        info!(peer = %peer_id, "connection closed");
    }

    fn on_connection_error(&mut self, peer_id: &PeerId, connection_id: ConnectionId, reason: &str) {
        if !self.is_current(peer_id, connection_id) {
            debug!(peer = %peer_id, connection = %connection_id, reason, "ignoring error on superseded connection");
            return;
        }
        self.registry.remove(peer_id);
        warn!(peer = %peer_id, reason, "connection failed");
    }

    /// True if `connection_id` is the connection registered for `peer_id`
    pub(crate) fn is_current(&self, peer_id: &PeerId, connection_id: ConnectionId) -> bool {
        self.registry
            .get(peer_id)
            .map_or(false, |record| record.connection_id() == connection_id)
    }

    // =========================================================================
    // SENDING
    // =========================================================================

    /// Send to one registered peer.
    ///
    /// A failed send counts as connection loss: the record is removed and
    /// the connection closed.
    pub fn send_to(&mut self, peer_id: &PeerId, message: &P2pMessage) -> Result<(), NodeError> {
        let connection = self
            .registry
            .get(peer_id)
            .map(|record| record.connection.clone())
            .ok_or_else(|| NodeError::UnknownPeer(peer_id.clone()))?;

        if let Err(e) = connection.send(message) {
            warn!(
                peer = %peer_id,
                msg_type = %message.message_type(),
                error = %e,
                "send failed, dropping peer"
            );
            self.drop_peer(peer_id);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reply on a peer's connection; failures are logged, not returned.
    pub(crate) fn reply(&mut self, peer_id: &PeerId, message: &P2pMessage) {
        if let Err(e) = self.send_to(peer_id, message) {
            debug!(peer = %peer_id, msg_type = %message.message_type(), error = %e, "reply not sent");
        }
    }

    /// Remove a peer and close its connection.
    pub(crate) fn drop_peer(&mut self, peer_id: &PeerId) -> bool {
        match self.registry.remove(peer_id) {
            Some(record) => {
                record.connection.close();
                true
            }
            None => false,
        }
    }

    /// Send DISCONNECT, close and forget one peer.
    pub fn disconnect(&mut self, peer_id: &PeerId, reason: &str) -> Result<(), NodeError> {
        let record = self
            .registry
            .remove(peer_id)
            .ok_or_else(|| NodeError::UnknownPeer(peer_id.clone()))?;

        let goodbye = P2pMessage::Disconnect(DisconnectPayload {
            reason: reason.to_string(),
        });
        if record.is_open() {
            if let Err(e) = record.connection.send(&goodbye) {
                debug!(peer = %peer_id, error = %e, "DISCONNECT not delivered");
            }
        }
        record.connection.close();
        info!(peer = %peer_id, reason, "disconnected peer");
        Ok(())
    }

    /// Say goodbye to every peer and empty the registry.
    pub fn shutdown(&mut self) {
        let goodbye = P2pMessage::Disconnect(DisconnectPayload {
            reason: "shutdown".to_string(),
        });
        let records = self.registry.drain();
        let count = records.len();
        for record in records {
            if record.is_open() {
                if let Err(e) = record.connection.send(&goodbye) {
                    debug!(peer = %record.peer_id, error = %e, "DISCONNECT not delivered");
                }
            }
            record.connection.close();
        }
        info!(peers = count, "node shut down");
    }
}
