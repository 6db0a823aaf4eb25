//! Helpers for running real nodes on loopback.

use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use peer_protocol::test_utils::RecordingApplication;
use peer_protocol::{
    NodeConfig, NodeHandle, NodePorts, P2pNode, PeerId, PeerNetworkApi, PeerSummary,
    StaticChainState, StaticPeerDiscovery, SystemTimeSource, TcpTransport,
};

/// Upper bound on any single wait in these tests
pub const WAIT: Duration = Duration::from_secs(5);

const POLL: Duration = Duration::from_millis(10);

static LOGGING: Once = Once::new();

/// Route node logs through the test harness; `RUST_LOG` selects the level.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A loopback address nobody is listening on right now.
pub fn free_addr() -> PeerId {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    PeerId::new(addr.to_string())
}

/// A running node and the application handler it delegates to.
pub struct TestNode {
    pub id: PeerId,
    pub handle: NodeHandle,
    pub app: Arc<RecordingApplication>,
}

/// Start a TCP node on a fresh port that dials `peers`.
pub async fn spawn_node(chain_id: &str, peers: &[PeerId]) -> TestNode {
    init_test_logging();

    let id = free_addr();
    let config = NodeConfig::new(id.clone(), chain_id)
        .with_capabilities(vec!["tx-relay".to_string()])
        .with_open_timeout(Duration::from_secs(2));
    let app = Arc::new(RecordingApplication::new());
    let ports = NodePorts {
        transport: Arc::new(TcpTransport::new()),
        discovery: Arc::new(StaticPeerDiscovery::new(peers.to_vec())),
        application: app.clone(),
        chain_state: Arc::new(StaticChainState::default()),
        time_source: Arc::new(SystemTimeSource::new()),
    };

    let handle = P2pNode::start(config, ports).await.expect("node starts");
    TestNode { id, handle, app }
}

/// Poll a synchronous condition until it holds or `WAIT` elapses.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(POLL).await;
    }
}

/// Wait until `node` has a record for `peer` satisfying `predicate`.
pub async fn wait_for_peer(
    node: &NodeHandle,
    peer: &PeerId,
    predicate: impl Fn(&PeerSummary) -> bool,
) -> PeerSummary {
    let deadline = Instant::now() + WAIT;
    loop {
        let peers = node.peers().await.expect("node running");
        if let Some(summary) = peers.into_iter().find(|s| &s.peer_id == peer) {
            if predicate(&summary) {
                return summary;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for peer {}", peer);
        tokio::time::sleep(POLL).await;
    }
}

/// Wait until `node` has no record for `peer`.
pub async fn wait_for_removal(node: &NodeHandle, peer: &PeerId) {
    let deadline = Instant::now() + WAIT;
    loop {
        let peers = node.peers().await.expect("node running");
        if peers.iter().all(|s| &s.peer_id != peer) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {} to go", peer);
        tokio::time::sleep(POLL).await;
    }
}
