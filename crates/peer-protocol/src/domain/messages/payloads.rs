//! Payload shapes for every catalogue entry.
//!
//! Field names are camelCase on the wire. Payloads the core only relays
//! (peer lists, chain state, attestations) are carried as opaque JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{PeerId, Timestamp};

/// HELLO: first message on a new connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    /// Sender's node identity
    pub peer_id: PeerId,
    /// Chain the sender is following
    pub chain_id: String,
    /// Sender's protocol version
    pub protocol_version: u32,
    /// Hash of the sender's latest block
    pub latest_block_hash: String,
    /// Height of the sender's latest block
    pub latest_block_height: u64,
    /// Optional features the sender supports
    pub capabilities: Vec<String>,
    /// Free-form client identifier
    pub user_agent: String,
}

/// HELLO_RESPONSE: the responder's identity plus its verdict on our HELLO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloResponsePayload {
    pub peer_id: PeerId,
    pub chain_id: String,
    pub protocol_version: u32,
    pub latest_block_hash: String,
    pub latest_block_height: u64,
    /// Whether the responder considers us compatible
    pub accepted: bool,
    pub capabilities: Vec<String>,
    pub user_agent: String,
    /// Human-readable rejection reason (absent when accepted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// PING: liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    /// Echoed back in the PONG
    pub nonce: String,
    /// Sender's clock when the PING was built
    pub timestamp: Timestamp,
}

/// PONG: reply to a PING.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongPayload {
    pub nonce: String,
    /// One-way latency observed by the PONG sender, in milliseconds
    pub latency: u64,
}

/// SEND_TX / TX_BROADCAST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    /// Application-defined transaction body
    pub transaction: Value,
    pub sender_public_key: String,
}

/// ANNOUNCE_CANDIDATE_BLOCK: summary of a block a peer is about to propose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateBlockPayload {
    /// Application-defined candidate summary
    pub block: Value,
}

/// BLOCK_PROPOSAL: full block plus the proofs the consensus layer checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockProposalPayload {
    pub block: Value,
    pub signature: String,
    pub puzzle_hash: String,
    pub puzzle_solution: Value,
    pub proof_of_access_hash: String,
}

/// ERROR: a peer rejected one of our messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Machine-readable error code (e.g. `UNSUPPORTED_MESSAGE_TYPE`)
    pub code: String,
    pub message: String,
    /// Type tag of the offending message, if it had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_message_ref: Option<String>,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            original_message_ref: None,
        }
    }

    /// Attach a reference to the message being rejected
    pub fn with_original(mut self, original: impl Into<String>) -> Self {
        self.original_message_ref = Some(original.into());
        self
    }
}

/// DISCONNECT: the sender is closing the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectPayload {
    pub reason: String,
}

/// Payload the core relays without interpreting.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaquePayload(pub Value);

impl OpaquePayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn empty() -> Self {
        Self(Value::Null)
    }
}
