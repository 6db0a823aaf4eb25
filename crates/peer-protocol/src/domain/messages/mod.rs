//! # Message Catalogue
//!
//! The closed set of wire messages. Every message is an object
//! `{"type": "<TAG>", "payload": {...}}`; payload fields are camelCase.
//!
//! Inbound traffic arrives as loosely-typed JSON and goes through
//! [`P2pMessage::from_value`] before dispatch. Unknown tags are an error,
//! never silently dropped.

mod payloads;

pub use payloads::{
    BlockProposalPayload, CandidateBlockPayload, DisconnectPayload, ErrorPayload,
    HelloPayload, HelloResponsePayload, OpaquePayload, PingPayload, PongPayload,
    TransactionPayload,
};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::domain::MessageError;

/// Discriminant of a [`P2pMessage`], i.e. the wire `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    HelloResponse,
    Ping,
    Pong,
    GetPeers,
    PeersResponse,
    GetChainState,
    ChainStateResponse,
    SendTx,
    TxBroadcast,
    AnnounceCandidateBlock,
    BlockProposal,
    SendAttestation,
    AttestationBroadcast,
    Error,
    Disconnect,
}

impl MessageType {
    /// Every catalogue entry
    pub const ALL: [MessageType; 16] = [
        Self::Hello,
        Self::HelloResponse,
        Self::Ping,
        Self::Pong,
        Self::GetPeers,
        Self::PeersResponse,
        Self::GetChainState,
        Self::ChainStateResponse,
        Self::SendTx,
        Self::TxBroadcast,
        Self::AnnounceCandidateBlock,
        Self::BlockProposal,
        Self::SendAttestation,
        Self::AttestationBroadcast,
        Self::Error,
        Self::Disconnect,
    ];

    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::HelloResponse => "HELLO_RESPONSE",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::GetPeers => "GET_PEERS",
            Self::PeersResponse => "PEERS_RESPONSE",
            Self::GetChainState => "GET_CHAIN_STATE",
            Self::ChainStateResponse => "CHAIN_STATE_RESPONSE",
            Self::SendTx => "SEND_TX",
            Self::TxBroadcast => "TX_BROADCAST",
            Self::AnnounceCandidateBlock => "ANNOUNCE_CANDIDATE_BLOCK",
            Self::BlockProposal => "BLOCK_PROPOSAL",
            Self::SendAttestation => "SEND_ATTESTATION",
            Self::AttestationBroadcast => "ATTESTATION_BROADCAST",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = MessageError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| MessageError::UnsupportedType(tag.to_string()))
    }
}

/// A protocol message.
///
/// Serde's adjacent tagging produces exactly the wire shape, so
/// `serde_json::to_value` is the outbound encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum P2pMessage {
    Hello(HelloPayload),
    HelloResponse(HelloResponsePayload),
    Ping(PingPayload),
    Pong(PongPayload),
    GetPeers(OpaquePayload),
    PeersResponse(OpaquePayload),
    GetChainState(OpaquePayload),
    ChainStateResponse(OpaquePayload),
    SendTx(TransactionPayload),
    TxBroadcast(TransactionPayload),
    AnnounceCandidateBlock(CandidateBlockPayload),
    BlockProposal(BlockProposalPayload),
    SendAttestation(OpaquePayload),
    AttestationBroadcast(OpaquePayload),
    Error(ErrorPayload),
    Disconnect(DisconnectPayload),
}

impl P2pMessage {
    /// The variant's wire tag
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Hello(_) => MessageType::Hello,
            Self::HelloResponse(_) => MessageType::HelloResponse,
            Self::Ping(_) => MessageType::Ping,
            Self::Pong(_) => MessageType::Pong,
            Self::GetPeers(_) => MessageType::GetPeers,
            Self::PeersResponse(_) => MessageType::PeersResponse,
            Self::GetChainState(_) => MessageType::GetChainState,
            Self::ChainStateResponse(_) => MessageType::ChainStateResponse,
            Self::SendTx(_) => MessageType::SendTx,
            Self::TxBroadcast(_) => MessageType::TxBroadcast,
            Self::AnnounceCandidateBlock(_) => MessageType::AnnounceCandidateBlock,
            Self::BlockProposal(_) => MessageType::BlockProposal,
            Self::SendAttestation(_) => MessageType::SendAttestation,
            Self::AttestationBroadcast(_) => MessageType::AttestationBroadcast,
            Self::Error(_) => MessageType::Error,
            Self::Disconnect(_) => MessageType::Disconnect,
        }
    }

    /// Validate a loosely-typed inbound object.
    ///
    /// Valid iff it is an object with a non-empty string `type` from the
    /// catalogue and a payload carrying that type's required fields.
    /// Opaque payloads may be omitted entirely.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let Value::Object(mut object) = value else {
            return Err(MessageError::NotAnObject);
        };

        let message_type = match object.get("type") {
            Some(Value::String(tag)) if !tag.is_empty() => tag.parse::<MessageType>()?,
            _ => return Err(MessageError::MissingType),
        };

        let payload = object.remove("payload").unwrap_or(Value::Null);
        Self::from_parts(message_type, payload)
    }

    /// Build a message from an already-known tag and a raw payload.
    pub fn from_parts(message_type: MessageType, payload: Value) -> Result<Self, MessageError> {
        let message = match message_type {
            MessageType::Hello => Self::Hello(decode(message_type, payload)?),
            MessageType::HelloResponse => Self::HelloResponse(decode(message_type, payload)?),
            MessageType::Ping => Self::Ping(decode(message_type, payload)?),
            MessageType::Pong => Self::Pong(decode(message_type, payload)?),
            MessageType::GetPeers => Self::GetPeers(OpaquePayload(payload)),
            MessageType::PeersResponse => Self::PeersResponse(OpaquePayload(payload)),
            MessageType::GetChainState => Self::GetChainState(OpaquePayload(payload)),
            MessageType::ChainStateResponse => Self::ChainStateResponse(OpaquePayload(payload)),
            MessageType::SendTx => Self::SendTx(decode(message_type, payload)?),
            MessageType::TxBroadcast => Self::TxBroadcast(decode(message_type, payload)?),
            MessageType::AnnounceCandidateBlock => {
                Self::AnnounceCandidateBlock(decode(message_type, payload)?)
            }
            MessageType::BlockProposal => Self::BlockProposal(decode(message_type, payload)?),
            MessageType::SendAttestation => Self::SendAttestation(OpaquePayload(payload)),
            MessageType::AttestationBroadcast => Self::AttestationBroadcast(OpaquePayload(payload)),
            MessageType::Error => Self::Error(decode(message_type, payload)?),
            MessageType::Disconnect => Self::Disconnect(decode(message_type, payload)?),
        };
        Ok(message)
    }

    /// Wire encoding for transports
    pub fn to_value(&self) -> Result<Value, MessageError> {
        serde_json::to_value(self).map_err(|e| MessageError::Encoding(e.to_string()))
    }

    /// ERROR reply for an inbound message that failed validation
    pub fn rejection(error: &MessageError, original_type: Option<&str>) -> Self {
        let mut payload = ErrorPayload::new(error.code(), error.to_string());
        if let Some(original) = original_type {
            payload = payload.with_original(original);
        }
        Self::Error(payload)
    }
}

fn decode<T: DeserializeOwned>(message_type: MessageType, payload: Value) -> Result<T, MessageError> {
    serde_json::from_value(payload).map_err(|e| MessageError::InvalidPayload {
        message_type,
        reason: e.to_string(),
    })
}
