//! # Peer-Net Node Protocol
//!
//! The protocol layer of a blockchain P2P node: a typed message catalogue,
//! a per-peer connection registry, the HELLO / HELLO_RESPONSE compatibility
//! handshake, inbound dispatch, broadcast to compatible peers, PING/PONG
//! liveness and the rule that a competing ANNOUNCE_CANDIDATE_BLOCK abandons
//! local block proposal work.
//!
//! Consensus, block validation and chain storage are out of scope: messages
//! the protocol layer does not own are handed to an `ApplicationHandler`.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** Messages, registry, handshake predicate, proposal flag
//! - **Ports Layer:** `PeerNetworkApi` (driving) and `Transport`,
//!   `PeerDiscovery`, `ApplicationHandler`, `ChainStateProvider`,
//!   `TimeSource` (driven)
//! - **Service Layer:** `P2pNode` state machine and its actor runtime
//! - **Adapters Layer:** Clock, static discovery, TCP and TOML (feature-gated)
//!
//! ## Example
//!
//! ```rust
//! use peer_protocol::{MessageType, P2pMessage};
//! use serde_json::json;
//!
//! let frame = json!({
//!     "type": "PING",
//!     "payload": { "nonce": "n-1", "timestamp": 1_700_000_000_000u64 }
//! });
//! let message = P2pMessage::from_value(frame).unwrap();
//! assert_eq!(message.message_type(), MessageType::Ping);
//!
//! let unknown = P2pMessage::from_value(json!({ "type": "FOO" }));
//! assert!(unknown.is_err());
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

/// Test utilities (MockConnection, MockTransport, FixedTimeSource, ...)
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// CORE RE-EXPORTS
// =============================================================================

// Domain entities
pub use domain::{
    ChainHead, ConnectionDirection, ConnectionId, ConnectionRecord, ConnectionRegistry,
    NodeConfig, PeerId, PeerSummary, ProposalFlag, RegistryStats, Timestamp,
};

// Messages
pub use domain::{
    BlockProposalPayload, CandidateBlockPayload, DisconnectPayload, ErrorPayload, HelloPayload,
    HelloResponsePayload, MessageType, OpaquePayload, P2pMessage, PingPayload, PongPayload,
    TransactionPayload,
};

// Handshake
pub use domain::{build_hello, build_hello_response, verify_hello, HandshakeResult, RejectReason};

// Errors and constants
pub use domain::{
    MessageError, NodeError, TransportError, DEFAULT_CHANNEL_CAPACITY, DEFAULT_OPEN_TIMEOUT,
    MALFORMED_MESSAGE, PROTOCOL_VERSION, UNSUPPORTED_MESSAGE_TYPE,
};

// Port traits
pub use ports::{
    ApplicationHandler, BroadcastReport, ChainStateProvider, Connection, ConnectionHandle,
    EventSender, PeerDiscovery, PeerNetworkApi, TimeSource, Transport, TransportEvent,
};

// Service
pub use service::{NodeHandle, NodePorts, P2pNode};

// =============================================================================
// ADAPTER RE-EXPORTS
// =============================================================================

pub use adapters::{LoggingApplication, StaticChainState, StaticPeerDiscovery, SystemTimeSource};

#[cfg(feature = "network")]
pub use adapters::{ConfigError, LoggingSettings, TcpConnection, TcpTransport, TomlConfigProvider};
