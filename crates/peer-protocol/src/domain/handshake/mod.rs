//! # Handshake Compatibility
//!
//! The HELLO / HELLO_RESPONSE exchange decides whether a peer takes part in
//! broadcast. The predicate is symmetric: both sides evaluate
//! `protocol_version == ours && chain_id == ours` on the other's HELLO, so
//! they converge on the same verdict without a coordination round.

use std::fmt;

use crate::domain::{ChainHead, HelloPayload, HelloResponsePayload, NodeConfig};

/// Result of checking a peer's HELLO against our own configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeResult {
    /// Peer is compatible
    Accept,
    /// Peer rejected; connection stays open but is excluded from broadcast
    Reject(RejectReason),
}

impl HandshakeResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Text sent in `HELLO_RESPONSE.reason`
    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Accept => None,
            Self::Reject(reason) => Some(reason.to_string()),
        }
    }
}

/// Reasons for rejecting a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Peer speaks a different protocol version
    ProtocolMismatch { ours: u32, theirs: u32 },
    /// Peer follows a different chain
    ChainMismatch { ours: String, theirs: String },
    /// An earlier handshake message on this connection was rejected
    PreviouslyRejected,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolMismatch { ours, theirs } => write!(
                f,
                "protocol version mismatch: expected {}, got {}",
                ours, theirs
            ),
            Self::ChainMismatch { ours, theirs } => {
                write!(f, "chain id mismatch: expected {}, got {}", ours, theirs)
            }
            Self::PreviouslyRejected => write!(f, "peer was already rejected on this connection"),
        }
    }
}

/// Check a peer's advertised protocol version and chain against ours.
pub fn verify_hello(config: &NodeConfig, protocol_version: u32, chain_id: &str) -> HandshakeResult {
    if protocol_version != config.protocol_version {
        return HandshakeResult::Reject(RejectReason::ProtocolMismatch {
            ours: config.protocol_version,
            theirs: protocol_version,
        });
    }

    if chain_id != config.chain_id {
        return HandshakeResult::Reject(RejectReason::ChainMismatch {
            ours: config.chain_id.clone(),
            theirs: chain_id.to_string(),
        });
    }

    HandshakeResult::Accept
}

/// HELLO advertising our identity and chain head
pub fn build_hello(config: &NodeConfig, head: &ChainHead) -> HelloPayload {
    HelloPayload {
        peer_id: config.peer_id.clone(),
        chain_id: config.chain_id.clone(),
        protocol_version: config.protocol_version,
        latest_block_hash: head.hash.clone(),
        latest_block_height: head.height,
        capabilities: config.capabilities.clone(),
        user_agent: config.user_agent.clone(),
    }
}

/// HELLO_RESPONSE carrying our identity and the verdict on the peer's HELLO
pub fn build_hello_response(
    config: &NodeConfig,
    head: &ChainHead,
    result: &HandshakeResult,
) -> HelloResponsePayload {
    HelloResponsePayload {
        peer_id: config.peer_id.clone(),
        chain_id: config.chain_id.clone(),
        protocol_version: config.protocol_version,
        latest_block_hash: head.hash.clone(),
        latest_block_height: head.height,
        accepted: result.is_accepted(),
        capabilities: config.capabilities.clone(),
        user_agent: config.user_agent.clone(),
        reason: result.reason(),
    }
}
