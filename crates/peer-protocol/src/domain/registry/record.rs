//! Connection records.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::{ConnectionDirection, ConnectionId, PeerId, Timestamp};
use crate::ports::ConnectionHandle;

/// State kept for one live peer connection.
pub struct ConnectionRecord {
    /// Peer identity (registry key)
    pub peer_id: PeerId,
    /// Transport handle; only `send`, `close` and `is_open` are used
    pub connection: ConnectionHandle,
    /// Who dialed whom
    pub direction: ConnectionDirection,
    /// Negotiated protocol version, once the peer has told us
    pub protocol_version: Option<u32>,
    /// False until a handshake message says otherwise
    pub is_compatible: bool,
    /// Features the peer advertised
    pub capabilities: BTreeSet<String>,
    pub user_agent: Option<String>,
    /// When the last PONG from this peer arrived
    pub last_ping_at: Option<Timestamp>,
    /// Latency reported in the last PONG
    pub last_latency_ms: Option<u64>,
    /// Last valid inbound message
    pub last_seen_at: Timestamp,
    pub connected_at: Timestamp,
    /// Why the handshake failed, if it did
    pub rejection_reason: Option<String>,
    /// Latched by the first rejecting handshake message
    rejected: bool,
}

impl ConnectionRecord {
    /// Fresh, not-yet-compatible record
    pub fn new(
        peer_id: PeerId,
        connection: ConnectionHandle,
        direction: ConnectionDirection,
        now: Timestamp,
    ) -> Self {
        Self {
            peer_id,
            connection,
            direction,
            protocol_version: None,
            is_compatible: false,
            capabilities: BTreeSet::new(),
            user_agent: None,
            last_ping_at: None,
            last_latency_ms: None,
            last_seen_at: now,
            connected_at: now,
            rejection_reason: None,
            rejected: false,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Member of the broadcast set
    pub fn is_compatible_open(&self) -> bool {
        self.is_compatible && self.is_open()
    }

    /// Copy what the peer told us about itself during the handshake.
    pub fn apply_peer_info(
        &mut self,
        protocol_version: u32,
        capabilities: &[String],
        user_agent: &str,
    ) {
        self.protocol_version = Some(protocol_version);
        self.capabilities = capabilities.iter().cloned().collect();
        self.user_agent = Some(user_agent.to_string());
    }

    /// Record a handshake verdict and return the resulting compatibility.
    ///
    /// Rejection is final for this record: an accepting verdict after an
    /// explicit rejection leaves the peer incompatible.
    pub fn set_compatibility(&mut self, compatible: bool, reason: Option<String>) -> bool {
        if !compatible {
            self.rejected = true;
            self.is_compatible = false;
            if reason.is_some() {
                self.rejection_reason = reason;
            }
        } else if !self.rejected {
            self.is_compatible = true;
        }
        self.is_compatible
    }

    /// True once any handshake message has rejected this peer
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// Snapshot without the transport handle
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            peer_id: self.peer_id.clone(),
            direction: self.direction,
            protocol_version: self.protocol_version,
            is_compatible: self.is_compatible,
            is_open: self.is_open(),
            capabilities: self.capabilities.iter().cloned().collect(),
            user_agent: self.user_agent.clone(),
            last_ping_at: self.last_ping_at,
            last_latency_ms: self.last_latency_ms,
            last_seen_at: self.last_seen_at,
            rejection_reason: self.rejection_reason.clone(),
        }
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("peer_id", &self.peer_id)
            .field("connection_id", &self.connection_id())
            .field("direction", &self.direction)
            .field("protocol_version", &self.protocol_version)
            .field("is_compatible", &self.is_compatible)
            .field("capabilities", &self.capabilities)
            .field("user_agent", &self.user_agent)
            .field("last_ping_at", &self.last_ping_at)
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a connection record, handed out across the actor
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub peer_id: PeerId,
    pub direction: ConnectionDirection,
    pub protocol_version: Option<u32>,
    pub is_compatible: bool,
    pub is_open: bool,
    pub capabilities: Vec<String>,
    pub user_agent: Option<String>,
    pub last_ping_at: Option<Timestamp>,
    pub last_latency_ms: Option<u64>,
    pub last_seen_at: Timestamp,
    pub rejection_reason: Option<String>,
}
