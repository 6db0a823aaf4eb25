//! Test utilities for the P2P node protocol.
//!
//! Mock implementations of the driven ports for deterministic testing.
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust
//! use peer_protocol::test_utils::FixedTimeSource;
//! use peer_protocol::TimeSource;
//!
//! let time = FixedTimeSource::new(1_000);
//! time.advance(50);
//! assert_eq!(time.now().as_millis(), 1_050);
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::domain::{
    ConnectionDirection, ConnectionId, MessageType, P2pMessage, PeerId, Timestamp,
    TransportError,
};
use crate::ports::{
    ApplicationHandler, Connection, ConnectionHandle, EventSender, TimeSource, Transport,
    TransportEvent,
};

// =============================================================================
// MockConnection
// =============================================================================

/// In-memory connection that records everything sent through it.
#[derive(Debug)]
pub struct MockConnection {
    id: ConnectionId,
    open: AtomicBool,
    fail_sends: AtomicBool,
    close_calls: AtomicUsize,
    sent: Mutex<Vec<P2pMessage>>,
}

impl MockConnection {
    /// Open connection
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            open: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Connection the transport already reports as closed
    pub fn closed() -> Arc<Self> {
        let connection = Self::new();
        connection.set_open(false);
        connection
    }

    /// Upcast to the handle type the node stores
    pub fn handle(self: &Arc<Self>) -> ConnectionHandle {
        self.clone()
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Make every subsequent `send` fail while the connection stays "open"
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<P2pMessage> {
        self.sent.lock().clone()
    }

    /// Drain recorded messages
    pub fn take_sent(&self) -> Vec<P2pMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Recorded messages of one type
    pub fn sent_of_type(&self, message_type: MessageType) -> Vec<P2pMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.message_type() == message_type)
            .cloned()
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: &P2pMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("injected failure".into()));
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

// =============================================================================
// FixedTimeSource
// =============================================================================

/// A controllable clock in milliseconds.
#[derive(Debug, Default)]
pub struct FixedTimeSource {
    millis: AtomicU64,
}

impl FixedTimeSource {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

// =============================================================================
// RecordingApplication
// =============================================================================

/// Application handler that records delegated messages and optionally
/// answers some message types with canned replies.
#[derive(Debug, Default)]
pub struct RecordingApplication {
    received: Mutex<Vec<(PeerId, P2pMessage)>>,
    replies: Mutex<HashMap<MessageType, P2pMessage>>,
}

impl RecordingApplication {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every message of `message_type` with `reply`
    pub fn reply_to(&self, message_type: MessageType, reply: P2pMessage) {
        self.replies.lock().insert(message_type, reply);
    }

    pub fn received(&self) -> Vec<(PeerId, P2pMessage)> {
        self.received.lock().clone()
    }

    pub fn received_of_type(&self, message_type: MessageType) -> Vec<(PeerId, P2pMessage)> {
        self.received
            .lock()
            .iter()
            .filter(|(_, m)| m.message_type() == message_type)
            .cloned()
            .collect()
    }
}

impl ApplicationHandler for RecordingApplication {
    fn on_message(&self, from: &PeerId, message: &P2pMessage) -> Option<P2pMessage> {
        self.received.lock().push((from.clone(), message.clone()));
        self.replies.lock().get(&message.message_type()).cloned()
    }
}

// =============================================================================
// MockTransport
// =============================================================================

/// How `MockTransport::start` behaves
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StartBehaviour {
    /// Start succeeds immediately
    #[default]
    Ready,
    /// Start fails with `InitFailed`
    Fail(String),
    /// Start never completes (exercises the open timeout)
    Hang,
}

/// Transport that hands out `MockConnection`s.
#[derive(Debug, Default)]
pub struct MockTransport {
    start_behaviour: StartBehaviour,
    unreachable: Mutex<HashSet<PeerId>>,
    hanging: Mutex<HashSet<PeerId>>,
    connections: Mutex<HashMap<PeerId, Arc<MockConnection>>>,
    events: Mutex<Option<EventSender>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_behaviour(behaviour: StartBehaviour) -> Self {
        Self {
            start_behaviour: behaviour,
            ..Self::default()
        }
    }

    /// Dials to `peer_id` fail
    pub fn mark_unreachable(&self, peer_id: impl Into<PeerId>) {
        self.unreachable.lock().insert(peer_id.into());
    }

    /// Dials to `peer_id` never complete
    pub fn mark_hanging(&self, peer_id: impl Into<PeerId>) {
        self.hanging.lock().insert(peer_id.into());
    }

    /// Connection handed out for the last dial to `peer_id`
    pub fn connection(&self, peer_id: &PeerId) -> Option<Arc<MockConnection>> {
        self.connections.lock().get(peer_id).cloned()
    }

    /// Event sender captured by `start`, for injecting inbound traffic
    pub fn events(&self) -> Option<EventSender> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start(&self, _local_id: &PeerId, events: EventSender) -> Result<(), TransportError> {
        match &self.start_behaviour {
            StartBehaviour::Ready => {
                *self.events.lock() = Some(events);
                Ok(())
            }
            StartBehaviour::Fail(reason) => Err(TransportError::InitFailed(reason.clone())),
            StartBehaviour::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn open(
        &self,
        peer_id: &PeerId,
        events: EventSender,
    ) -> Result<ConnectionHandle, TransportError> {
        if self.unreachable.lock().contains(peer_id) {
            return Err(TransportError::ConnectFailed {
                peer: peer_id.clone(),
                reason: "unreachable".into(),
            });
        }
        let hang = self.hanging.lock().contains(peer_id);
        if hang {
            std::future::pending::<()>().await;
        }
        let connection = MockConnection::new();
        self.connections
            .lock()
            .insert(peer_id.clone(), connection.clone());
        events
            .emit(TransportEvent::Opened {
                peer_id: peer_id.clone(),
                connection: connection.handle(),
                direction: ConnectionDirection::Outbound,
            })
            .await?;
        Ok(connection.handle())
    }
}
