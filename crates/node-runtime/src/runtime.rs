//! Wiring of a TCP-backed node.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peer_protocol::{
    LoggingApplication, NodeHandle, NodePorts, P2pNode, PeerNetworkApi, StaticChainState,
    StaticPeerDiscovery, SystemTimeSource, TcpTransport, TomlConfigProvider,
};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "PEER_NET_CONFIG";

/// Config file used when neither argv nor the environment names one
pub const DEFAULT_CONFIG_PATH: &str = "peer-net.toml";

/// First CLI argument, else `PEER_NET_CONFIG`, else `peer-net.toml`.
pub fn resolve_config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// A started node plus its periodic PING sweep.
pub struct NodeRuntime {
    handle: NodeHandle,
    chain_state: Arc<StaticChainState>,
    ping_task: Option<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Start a node from loaded settings.
    pub async fn start(settings: &TomlConfigProvider) -> Result<Self> {
        let config = settings.node_config().clone();
        let chain_state = Arc::new(StaticChainState::default());
        let ports = NodePorts {
            transport: Arc::new(TcpTransport::new()),
            discovery: Arc::new(StaticPeerDiscovery::new(settings.bootstrap_peers().to_vec())),
            application: Arc::new(LoggingApplication::new()),
            chain_state: chain_state.clone(),
            time_source: Arc::new(SystemTimeSource::new()),
        };

        let peer_id = config.peer_id.clone();
        let handle = P2pNode::start(config, ports)
            .await
            .with_context(|| format!("failed to start node {}", peer_id))?;

        let ping_task = settings
            .ping_interval()
            .map(|period| tokio::spawn(ping_sweep(handle.clone(), period)));

        info!(
            peer_id = %peer_id,
            bootstrap = settings.bootstrap_peers().len(),
            "node started"
        );
        Ok(Self {
            handle,
            chain_state,
            ping_task,
        })
    }

    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    /// Chain head advertised in handshakes
    pub fn chain_state(&self) -> &Arc<StaticChainState> {
        &self.chain_state
    }

    /// Stop the PING sweep and say goodbye to every peer.
    pub async fn shutdown(self) -> Result<()> {
        if let Some(task) = self.ping_task {
            task.abort();
        }
        self.handle.stop().await.context("failed to stop node")?;
        info!("node runtime stopped");
        Ok(())
    }
}

/// PING every compatible peer once per `period`, until the node stops.
async fn ping_sweep(handle: NodeHandle, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let peers = match handle.compatible_peers().await {
            Ok(peers) => peers,
            Err(e) => {
                debug!(error = %e, "ping sweep ending");
                return;
            }
        };
        for peer_id in peers {
            if let Err(e) = handle.ping(peer_id.clone()).await {
                warn!(peer = %peer_id, error = %e, "ping failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_resolution() {
        struct TestCase {
            arg: Option<&'static str>,
            env: Option<&'static str>,
            expected: &'static str,
        }

        let cases = vec![
            TestCase {
                arg: Some("node-a.toml"),
                env: Some("env.toml"),
                expected: "node-a.toml",
            },
            TestCase {
                arg: None,
                env: Some("env.toml"),
                expected: "env.toml",
            },
            TestCase {
                arg: None,
                env: None,
                expected: DEFAULT_CONFIG_PATH,
            },
            TestCase {
                arg: Some(" "),
                env: None,
                expected: DEFAULT_CONFIG_PATH,
            },
        ];

        for case in cases {
            let path = resolve_config_path(
                case.arg.map(str::to_string),
                case.env.map(str::to_string),
            );
            assert_eq!(path, PathBuf::from(case.expected));
        }
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let settings = TomlConfigProvider::parse(&format!(
            "[node]\npeer_id = \"127.0.0.1:{}\"\nchain_id = \"devnet\"\nping_interval_secs = 1\n",
            port
        ))
        .unwrap();

        let runtime = NodeRuntime::start(&settings).await.unwrap();
        assert!(runtime.handle().peers().await.unwrap().is_empty());
        let handle = runtime.handle().clone();

        runtime.shutdown().await.unwrap();
        assert!(handle.stats().await.is_err());
    }
}
