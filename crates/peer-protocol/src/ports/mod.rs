//! # Ports Layer
//!
//! - **Inbound (API):** what the host application calls on a running node
//! - **Outbound (SPI):** what the host application must provide

pub mod inbound;
pub mod outbound;

pub use inbound::{BroadcastReport, PeerNetworkApi};
pub use outbound::{
    ApplicationHandler, ChainStateProvider, Connection, ConnectionHandle, EventSender,
    PeerDiscovery, TimeSource, Transport, TransportEvent,
};
