//! # P2P Node Service
//!
//! The node's protocol engine: connection lifecycle, inbound dispatch, the
//! handshake exchange, liveness, broadcast and the proposal rule, plus the
//! actor runtime that drives them.
//!
//! `P2pNode` is a plain state machine that can be driven synchronously
//! (`handle_transport_event`, `broadcast`, ...). `P2pNode::start` wraps it
//! in a task and returns a `NodeHandle`.

mod broadcast;
mod core;
mod dispatch;
mod handshake;
mod liveness;
mod runtime;

pub use self::core::{NodePorts, P2pNode};
pub use runtime::NodeHandle;

#[cfg(test)]
mod tests;
