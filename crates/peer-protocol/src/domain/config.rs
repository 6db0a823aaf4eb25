//! Node configuration.

use std::time::Duration;

use crate::domain::{NodeError, PeerId};

/// Protocol version spoken by this implementation
pub const PROTOCOL_VERSION: u32 = 1;

/// How long to wait for the transport (or a dial) to reach "open"
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound queue depth of the node actor
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Static configuration of a local node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Our identity (also our listening address)
    pub peer_id: PeerId,
    /// Chain we follow; peers on other chains are incompatible
    pub chain_id: String,
    /// Protocol version; peers on other versions are incompatible
    pub protocol_version: u32,
    /// Features advertised in HELLO
    pub capabilities: Vec<String>,
    /// Client identifier advertised in HELLO
    pub user_agent: String,
    /// Bound on transport start and on each dial
    pub open_timeout: Duration,
    /// Capacity of the actor's inbound channel
    pub channel_capacity: usize,
}

impl NodeConfig {
    /// Config with defaults for everything except identity and chain
    pub fn new(peer_id: impl Into<PeerId>, chain_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            chain_id: chain_id.into(),
            protocol_version: PROTOCOL_VERSION,
            capabilities: Vec::new(),
            user_agent: default_user_agent(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Reject configurations a node cannot start with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.peer_id.is_empty() {
            return Err(NodeError::InvalidConfig("peer id must not be empty".into()));
        }
        if self.chain_id.is_empty() {
            return Err(NodeError::InvalidConfig("chain id must not be empty".into()));
        }
        if self.open_timeout.is_zero() {
            return Err(NodeError::InvalidConfig("open timeout must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(NodeError::InvalidConfig("channel capacity must be positive".into()));
        }
        Ok(())
    }

    /// Testing config
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing(peer_id: &str) -> Self {
        Self::new(peer_id, "test-chain")
            .with_capabilities(vec!["tx-relay".to_string()])
            .with_open_timeout(Duration::from_millis(500))
    }
}

/// `peer-net/<crate version>`
pub fn default_user_agent() -> String {
    format!("peer-net/{}", env!("CARGO_PKG_VERSION"))
}
