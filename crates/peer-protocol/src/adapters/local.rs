//! In-process adapters: clock, static discovery, chain head and a logging
//! application handler.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::domain::{ChainHead, P2pMessage, PeerId, Timestamp};
use crate::ports::{ApplicationHandler, ChainStateProvider, PeerDiscovery, TimeSource};

// ============================================================================
// SystemTimeSource - Production Time Source
// ============================================================================

/// Wall clock in milliseconds since the Unix epoch.
///
/// # Example
///
/// ```rust
/// use peer_protocol::adapters::SystemTimeSource;
/// use peer_protocol::ports::TimeSource;
///
/// let now = SystemTimeSource::new().now();
/// assert!(now.as_millis() > 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Timestamp::from_millis(duration.as_millis() as u64)
    }
}

// ============================================================================
// StaticPeerDiscovery
// ============================================================================

/// Fixed list of peers, typically the bootstrap list from config.
#[derive(Debug, Clone, Default)]
pub struct StaticPeerDiscovery {
    peers: Vec<PeerId>,
}

impl StaticPeerDiscovery {
    #[must_use]
    pub fn new(peers: Vec<PeerId>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl PeerDiscovery for StaticPeerDiscovery {
    async fn discover_peers(&self) -> Vec<PeerId> {
        self.peers.clone()
    }
}

// ============================================================================
// StaticChainState
// ============================================================================

/// Chain head held in memory and updated by whoever owns the chain.
#[derive(Debug, Default)]
pub struct StaticChainState {
    head: RwLock<ChainHead>,
}

impl StaticChainState {
    #[must_use]
    pub fn new(head: ChainHead) -> Self {
        Self {
            head: RwLock::new(head),
        }
    }

    /// Replace the advertised head; later handshakes carry the new value.
    pub fn update(&self, head: ChainHead) {
        *self.head.write() = head;
    }
}

impl ChainStateProvider for StaticChainState {
    fn latest_block(&self) -> ChainHead {
        self.head.read().clone()
    }
}

// ============================================================================
// LoggingApplication
// ============================================================================

/// Application handler that only logs what it is given.
///
/// Stand-in for a real consensus layer; it never replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingApplication;

impl LoggingApplication {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ApplicationHandler for LoggingApplication {
    fn on_message(&self, from: &PeerId, message: &P2pMessage) -> Option<P2pMessage> {
        info!(peer = %from, msg_type = %message.message_type(), "received application message");
        None
    }
}
