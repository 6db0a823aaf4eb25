//! Domain Errors for the P2P node protocol

use thiserror::Error;

use crate::domain::{MessageType, PeerId};

/// Error code sent in ERROR replies for unknown `type` tags
pub const UNSUPPORTED_MESSAGE_TYPE: &str = "UNSUPPORTED_MESSAGE_TYPE";

/// Error code sent in ERROR replies for anything else failing validation
pub const MALFORMED_MESSAGE: &str = "MALFORMED_MESSAGE";

/// Catalogue validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("malformed message: expected a JSON object")]
    NotAnObject,

    #[error("malformed message: missing or empty type")]
    MissingType,

    #[error("unsupported message type: {0}")]
    UnsupportedType(String),

    #[error("malformed {message_type} payload: {reason}")]
    InvalidPayload {
        message_type: MessageType,
        reason: String,
    },

    #[error("failed to encode message: {0}")]
    Encoding(String),
}

impl MessageError {
    /// Code carried in the ERROR reply
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => UNSUPPORTED_MESSAGE_TYPE,
            _ => MALFORMED_MESSAGE,
        }
    }
}

/// Failures reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to initialise transport: {0}")]
    InitFailed(String),

    #[error("failed to connect to {peer}: {reason}")]
    ConnectFailed { peer: PeerId, reason: String },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("transport not started")]
    NotStarted,
}

/// Node-level errors surfaced to the host process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("invalid node configuration: {0}")]
    InvalidConfig(String),

    #[error("transport did not open within {timeout_ms}ms")]
    StartupTimeout { timeout_ms: u64 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("no connection to peer {0}")]
    UnknownPeer(PeerId),

    #[error("refusing to connect to own identity {0}")]
    SelfConnection(PeerId),

    #[error("node is not running")]
    NotRunning,
}
