//! # TOML Configuration
//!
//! Loads node settings from a file. Every key except `node.peer_id` and
//! `node.chain_id` has a default.
//!
//! ```toml
//! [node]
//! peer_id = "127.0.0.1:7001"
//! chain_id = "devnet"
//! protocol_version = 1
//! capabilities = ["tx-relay", "attestations"]
//! user_agent = "peer-net/0.1.0"
//! open_timeout_ms = 10000
//! channel_capacity = 1024
//! ping_interval_secs = 30
//!
//! [discovery]
//! peers = ["127.0.0.1:7002", "127.0.0.1:7003"]
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{
    default_user_agent, NodeConfig, PeerId, DEFAULT_CHANNEL_CAPACITY, DEFAULT_OPEN_TIMEOUT,
    PROTOCOL_VERSION,
};

/// Errors that can occur during config loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {error}")]
    Io { path: String, error: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    node: NodeSection,
    #[serde(default)]
    discovery: DiscoverySection,
    #[serde(default)]
    logging: LoggingSettings,
}

#[derive(Debug, Deserialize)]
struct NodeSection {
    peer_id: String,
    chain_id: String,
    protocol_version: Option<u32>,
    #[serde(default)]
    capabilities: Vec<String>,
    user_agent: Option<String>,
    open_timeout_ms: Option<u64>,
    channel_capacity: Option<usize>,
    ping_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DiscoverySection {
    #[serde(default)]
    peers: Vec<String>,
}

/// `[logging]` section, consumed by the binary's subscriber setup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Node settings loaded from TOML.
#[derive(Debug, Clone)]
pub struct TomlConfigProvider {
    config: NodeConfig,
    bootstrap_peers: Vec<PeerId>,
    ping_interval: Option<Duration>,
    logging: LoggingSettings,
}

impl TomlConfigProvider {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let node = file.node;
        let config = NodeConfig {
            peer_id: PeerId::new(node.peer_id),
            chain_id: node.chain_id,
            protocol_version: node.protocol_version.unwrap_or(PROTOCOL_VERSION),
            capabilities: node.capabilities,
            user_agent: node.user_agent.unwrap_or_else(default_user_agent),
            open_timeout: node
                .open_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_OPEN_TIMEOUT),
            channel_capacity: node.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
        };
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        // Blank entries are dropped; discovery order is kept.
        let bootstrap_peers = file
            .discovery
            .peers
            .into_iter()
            .map(|peer| peer.trim().to_string())
            .filter(|peer| !peer.is_empty())
            .map(PeerId::new)
            .collect();

        Ok(Self {
            config,
            bootstrap_peers,
            ping_interval: node
                .ping_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            logging: file.logging,
        })
    }

    pub fn node_config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn bootstrap_peers(&self) -> &[PeerId] {
        &self.bootstrap_peers
    }

    /// Period of the binary's PING sweep; `None` disables it
    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval
    }

    pub fn logging(&self) -> &LoggingSettings {
        &self.logging
    }
}
