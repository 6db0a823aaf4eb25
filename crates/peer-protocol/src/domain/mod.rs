//! # Domain Layer
//!
//! Pure protocol logic: the message catalogue, connection records, the
//! handshake predicate and the proposal flag. No I/O happens here.

pub mod config;
pub mod errors;
pub mod handshake;
pub mod messages;
pub mod proposal;
pub mod registry;
pub mod value_objects;

pub use config::{
    default_user_agent, NodeConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_OPEN_TIMEOUT,
    PROTOCOL_VERSION,
};
pub use errors::{
    MessageError, NodeError, TransportError, MALFORMED_MESSAGE, UNSUPPORTED_MESSAGE_TYPE,
};
pub use handshake::{
    build_hello, build_hello_response, verify_hello, HandshakeResult, RejectReason,
};
pub use messages::{
    BlockProposalPayload, CandidateBlockPayload, DisconnectPayload, ErrorPayload, HelloPayload,
    HelloResponsePayload, MessageType, OpaquePayload, P2pMessage, PingPayload, PongPayload,
    TransactionPayload,
};
pub use proposal::ProposalFlag;
pub use registry::{ConnectionRecord, ConnectionRegistry, PeerSummary, RegistryStats};
pub use value_objects::{ChainHead, ConnectionDirection, ConnectionId, PeerId, Timestamp};
