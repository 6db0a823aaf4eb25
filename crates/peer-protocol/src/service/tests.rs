//! Tests for the node service

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::adapters::{StaticChainState, StaticPeerDiscovery};
use crate::domain::{
    CandidateBlockPayload, ChainHead, ConnectionDirection, DisconnectPayload, HandshakeResult,
    MessageType, NodeConfig, NodeError, OpaquePayload, P2pMessage, PeerId, PingPayload,
    Timestamp, TransactionPayload, TransportError, MALFORMED_MESSAGE, UNSUPPORTED_MESSAGE_TYPE,
};
use crate::ports::{Connection, EventSender, PeerNetworkApi, TransportEvent};
use crate::test_utils::{
    FixedTimeSource, MockConnection, MockTransport, RecordingApplication, StartBehaviour,
};

// =============================================================================
// HARNESS
// =============================================================================

struct Harness {
    node: P2pNode,
    time: Arc<FixedTimeSource>,
    app: Arc<RecordingApplication>,
    _events: tokio::sync::mpsc::Receiver<TransportEvent>,
}

fn ports_with(
    transport: Arc<MockTransport>,
    discovered: Vec<PeerId>,
    time: Arc<FixedTimeSource>,
    app: Arc<RecordingApplication>,
) -> NodePorts {
    NodePorts {
        transport,
        discovery: Arc::new(StaticPeerDiscovery::new(discovered)),
        application: app,
        chain_state: Arc::new(StaticChainState::new(ChainHead::new("ab".repeat(32), 7))),
        time_source: time,
    }
}

fn harness(config: NodeConfig) -> Harness {
    let time = Arc::new(FixedTimeSource::new(1_000));
    let app = Arc::new(RecordingApplication::new());
    let ports = ports_with(
        Arc::new(MockTransport::new()),
        Vec::new(),
        time.clone(),
        app.clone(),
    );
    let (events, rx) = EventSender::channel(16);
    Harness {
        node: P2pNode::new(config, ports, events),
        time,
        app,
        _events: rx,
    }
}

impl Harness {
    fn open(&mut self, peer: &str, direction: ConnectionDirection) -> Arc<MockConnection> {
        let connection = MockConnection::new();
        self.node.handle_transport_event(TransportEvent::Opened {
            peer_id: PeerId::new(peer),
            connection: connection.handle(),
            direction,
        });
        connection
    }

    /// Open an inbound connection and mark it compatible via HELLO
    fn compatible_peer(&mut self, peer: &str) -> Arc<MockConnection> {
        let connection = self.open(peer, ConnectionDirection::Inbound);
        let hello = NodeConfig::for_testing(peer);
        let hello = crate::domain::build_hello(&hello, &ChainHead::genesis());
        self.deliver(peer, &connection, &P2pMessage::Hello(hello));
        connection.take_sent();
        connection
    }

    fn deliver_raw(&mut self, peer: &str, connection: &Arc<MockConnection>, message: Value) {
        self.node.handle_transport_event(TransportEvent::Data {
            peer_id: PeerId::new(peer),
            connection_id: connection.id(),
            message,
        });
    }

    fn deliver(&mut self, peer: &str, connection: &Arc<MockConnection>, message: &P2pMessage) {
        let wire = message.to_value().unwrap();
        self.deliver_raw(peer, connection, wire);
    }

    fn is_compatible(&self, peer: &str) -> bool {
        self.node
            .registry()
            .get(&PeerId::new(peer))
            .map_or(false, |record| record.is_compatible)
    }
}

/// Shuttle frames between two nodes until both directions are quiet.
fn pump(
    a: &mut Harness,
    a_side: &Arc<MockConnection>,
    b: &mut Harness,
    b_side: &Arc<MockConnection>,
) {
    let a_id = a.node.local_id().as_str().to_string();
    let b_id = b.node.local_id().as_str().to_string();
    for _ in 0..10 {
        let from_a = a_side.take_sent();
        let from_b = b_side.take_sent();
        if from_a.is_empty() && from_b.is_empty() {
            return;
        }
        for message in from_a {
            b.deliver(&a_id, b_side, &message);
        }
        for message in from_b {
            a.deliver(&b_id, a_side, &message);
        }
    }
}

fn tx_broadcast() -> P2pMessage {
    P2pMessage::TxBroadcast(TransactionPayload {
        transaction: json!({"amount": 5}),
        sender_public_key: "pk".into(),
    })
}

fn candidate() -> P2pMessage {
    P2pMessage::AnnounceCandidateBlock(CandidateBlockPayload {
        block: json!({"height": 8}),
    })
}

// =============================================================================
// HANDSHAKE
// =============================================================================

#[test]
fn test_matching_handshake_converges_on_both_sides() {
    let mut a = harness(NodeConfig::for_testing("a"));
    let mut b = harness(NodeConfig::for_testing("b"));

    let a_side = a.open("b", ConnectionDirection::Outbound);
    let b_side = b.open("a", ConnectionDirection::Inbound);
    assert_eq!(a_side.sent_of_type(MessageType::Hello).len(), 1);

    pump(&mut a, &a_side, &mut b, &b_side);

    assert!(a.is_compatible("b"));
    assert!(b.is_compatible("a"));
    let b_record = b.node.registry().get(&PeerId::new("a")).unwrap();
    assert_eq!(b_record.protocol_version, Some(1));
    assert!(b_record.capabilities.contains("tx-relay"));
}

#[test]
fn test_chain_mismatch_rejects_but_keeps_connection() {
    let mut a = harness(NodeConfig::for_testing("a"));
    let mut b = harness(NodeConfig::new("b", "other-chain"));

    let a_side = a.open("b", ConnectionDirection::Outbound);
    let b_side = b.open("a", ConnectionDirection::Inbound);
    let hello = a_side.take_sent().remove(0);
    b.deliver("a", &b_side, &hello);

    let responses = b_side.sent_of_type(MessageType::HelloResponse);
    assert_eq!(responses.len(), 1);
    match &responses[0] {
        P2pMessage::HelloResponse(response) => {
            assert!(!response.accepted);
            assert!(response.reason.as_deref().unwrap().contains("chain id mismatch"));
        }
        other => panic!("expected HELLO_RESPONSE, got {:?}", other),
    }

    a.deliver("b", &a_side, &responses[0]);

    for (node, peer, connection) in [(&a, "b", &a_side), (&b, "a", &b_side)] {
        let record = node.node.registry().get(&PeerId::new(peer)).unwrap();
        assert!(!record.is_compatible);
        assert!(record.rejection_reason.is_some());
        assert!(connection.is_open());
        assert_eq!(connection.close_count(), 0);
    }
}

#[test]
fn test_protocol_mismatch_rejects() {
    let mut a = harness(NodeConfig::for_testing("a").with_protocol_version(2));
    let mut b = harness(NodeConfig::for_testing("b"));

    let a_side = a.open("b", ConnectionDirection::Outbound);
    let b_side = b.open("a", ConnectionDirection::Inbound);
    pump(&mut a, &a_side, &mut b, &b_side);

    assert!(!a.is_compatible("b"));
    assert!(!b.is_compatible("a"));
    assert_eq!(b.node.registry().stats().total, 1);
}

#[test]
fn test_inbound_open_does_not_send_hello() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.open("b", ConnectionDirection::Inbound);
    assert_eq!(connection.sent_count(), 0);
    assert!(!node.is_compatible("b"));
}

fn foreign_hello(peer: &str) -> P2pMessage {
    let config = NodeConfig::new(peer, "other-chain");
    P2pMessage::Hello(crate::domain::build_hello(&config, &ChainHead::genesis()))
}

fn matching_hello(peer: &str) -> P2pMessage {
    let config = NodeConfig::for_testing(peer);
    P2pMessage::Hello(crate::domain::build_hello(&config, &ChainHead::genesis()))
}

#[test]
fn test_rejected_peer_stays_incompatible_after_matching_hello() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.open("b", ConnectionDirection::Inbound);

    node.deliver("b", &connection, &foreign_hello("b"));
    assert!(!node.is_compatible("b"));

    node.deliver("b", &connection, &matching_hello("b"));
    assert!(!node.is_compatible("b"));

    let responses = connection.sent_of_type(MessageType::HelloResponse);
    assert_eq!(responses.len(), 2);
    match &responses[1] {
        P2pMessage::HelloResponse(response) => {
            assert!(!response.accepted);
            assert!(response.reason.as_deref().unwrap().contains("already rejected"));
        }
        other => panic!("expected HELLO_RESPONSE, got {:?}", other),
    }

    let record = node.node.registry().get(&PeerId::new("b")).unwrap();
    assert!(record
        .rejection_reason
        .as_deref()
        .unwrap()
        .contains("chain id mismatch"));
    assert!(node.node.registry().list_compatible_open().is_empty());
}

#[test]
fn test_rejected_peer_stays_incompatible_after_accepting_response() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.open("b", ConnectionDirection::Outbound);

    node.deliver("b", &connection, &foreign_hello("b"));
    assert!(!node.is_compatible("b"));

    let accepted = crate::domain::build_hello_response(
        &NodeConfig::for_testing("b"),
        &ChainHead::genesis(),
        &HandshakeResult::Accept,
    );
    node.deliver("b", &connection, &P2pMessage::HelloResponse(accepted));

    assert!(!node.is_compatible("b"));
    assert_eq!(node.node.registry().stats().compatible, 0);
}

// =============================================================================
// CONNECTION LIFECYCLE
// =============================================================================

#[test]
fn test_reopen_replaces_record_and_ignores_stale_close() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let first = node.open("b", ConnectionDirection::Inbound);
    let second = node.open("b", ConnectionDirection::Outbound);

    assert_eq!(node.node.registry().len(), 1);

    node.node.handle_transport_event(TransportEvent::Closed {
        peer_id: PeerId::new("b"),
        connection_id: first.id(),
    });
    let record = node.node.registry().get(&PeerId::new("b")).unwrap();
    assert_eq!(record.connection_id(), second.id());

    node.node.handle_transport_event(TransportEvent::Error {
        peer_id: PeerId::new("b"),
        connection_id: second.id(),
        reason: "reset by peer".into(),
    });
    assert!(node.node.registry().is_empty());
}

#[test]
fn test_frames_on_replaced_connection_are_ignored() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let first = node.compatible_peer("b");
    let second = node.compatible_peer("b");

    node.deliver(
        "b",
        &first,
        &P2pMessage::Disconnect(DisconnectPayload {
            reason: "old".into(),
        }),
    );
    node.deliver("b", &first, &foreign_hello("b"));

    let record = node.node.registry().get(&PeerId::new("b")).unwrap();
    assert_eq!(record.connection_id(), second.id());
    assert!(record.is_compatible);
    assert!(second.is_open());
    assert_eq!(second.close_count(), 0);
    assert_eq!(second.sent_count(), 0);

    node.deliver(
        "b",
        &second,
        &P2pMessage::Disconnect(DisconnectPayload {
            reason: "bye".into(),
        }),
    );
    assert!(node.node.registry().is_empty());
}

#[test]
fn test_connection_to_own_identity_is_closed() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.open("a", ConnectionDirection::Inbound);
    assert!(!connection.is_open());
    assert!(node.node.registry().is_empty());
}

#[test]
fn test_disconnect_message_removes_peer() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.compatible_peer("b");

    node.deliver(
        "b",
        &connection,
        &P2pMessage::Disconnect(DisconnectPayload {
            reason: "bye".into(),
        }),
    );

    assert!(node.node.registry().is_empty());
    assert!(node.node.registry().list_compatible_open().is_empty());
    assert_eq!(connection.close_count(), 1);
}

#[test]
fn test_frames_after_removal_are_ignored() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.compatible_peer("b");
    node.node.handle_transport_event(TransportEvent::Closed {
        peer_id: PeerId::new("b"),
        connection_id: connection.id(),
    });

    node.deliver("b", &connection, &tx_broadcast());
    assert!(node.app.received().is_empty());
}

#[test]
fn test_local_disconnect_says_goodbye() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.compatible_peer("b");

    node.node.disconnect(&PeerId::new("b"), "maintenance").unwrap();

    let sent = connection.sent_of_type(MessageType::Disconnect);
    assert_eq!(sent.len(), 1);
    assert!(!connection.is_open());
    assert_eq!(
        node.node.disconnect(&PeerId::new("b"), "again"),
        Err(NodeError::UnknownPeer(PeerId::new("b")))
    );
}

#[test]
fn test_shutdown_disconnects_every_open_peer() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let b = node.compatible_peer("b");
    let c = node.open("c", ConnectionDirection::Inbound);
    c.set_open(false);

    node.node.shutdown();

    assert!(node.node.registry().is_empty());
    match &b.sent_of_type(MessageType::Disconnect)[..] {
        [P2pMessage::Disconnect(goodbye)] => assert_eq!(goodbye.reason, "shutdown"),
        other => panic!("expected one DISCONNECT, got {:?}", other),
    }
    assert_eq!(c.sent_count(), 0);
    assert_eq!(c.close_count(), 1);
}

// =============================================================================
// BROADCAST
// =============================================================================

#[test]
fn test_broadcast_reaches_only_compatible_open_peers() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let good = node.compatible_peer("good");
    let incompatible = node.open("incompatible", ConnectionDirection::Inbound);
    let closed = node.compatible_peer("closed");
    closed.set_open(false);

    let report = node.node.broadcast(&tx_broadcast());

    assert_eq!(report.delivered, vec![PeerId::new("good")]);
    assert!(report.failed.is_empty());
    assert_eq!(good.sent_of_type(MessageType::TxBroadcast).len(), 1);
    assert_eq!(incompatible.sent_count(), 0);
    assert_eq!(closed.sent_count(), 0);
}

#[test]
fn test_broadcast_failure_drops_peer_and_continues() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let b = node.compatible_peer("b");
    let c = node.compatible_peer("c");
    b.fail_sends(true);

    let report = node.node.broadcast(&tx_broadcast());

    assert_eq!(report.failed, vec![PeerId::new("b")]);
    assert_eq!(report.delivered, vec![PeerId::new("c")]);
    assert_eq!(c.sent_count(), 1);
    assert!(!node.node.registry().contains(&PeerId::new("b")));
    assert_eq!(node.node.registry().list_compatible_open().len(), 1);
}

#[test]
fn test_send_to_unknown_peer_fails() {
    let mut node = harness(NodeConfig::for_testing("a"));
    assert_eq!(
        node.node.send_to(&PeerId::new("ghost"), &tx_broadcast()),
        Err(NodeError::UnknownPeer(PeerId::new("ghost")))
    );
}

#[test]
fn test_send_to_failure_is_connection_loss() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.open("b", ConnectionDirection::Inbound);
    connection.fail_sends(true);

    let result = node.node.send_to(&PeerId::new("b"), &tx_broadcast());

    assert!(matches!(
        result,
        Err(NodeError::Transport(TransportError::SendFailed(_)))
    ));
    assert!(node.node.registry().is_empty());
}

// =============================================================================
// LIVENESS
// =============================================================================

#[test]
fn test_ping_latency_uses_local_clock() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.compatible_peer("b");
    node.time.set(10_050);

    node.deliver(
        "b",
        &connection,
        &P2pMessage::Ping(PingPayload {
            nonce: "n-1".into(),
            timestamp: Timestamp::from_millis(10_000),
        }),
    );

    match &connection.sent()[..] {
        [P2pMessage::Pong(pong)] => {
            assert_eq!(pong.nonce, "n-1");
            assert_eq!(pong.latency, 50);
        }
        other => panic!("expected one PONG, got {:?}", other),
    }
}

#[test]
fn test_ping_pong_round_trip_records_latency() {
    let mut a = harness(NodeConfig::for_testing("a"));
    let mut b = harness(NodeConfig::for_testing("b"));
    let a_side = a.open("b", ConnectionDirection::Outbound);
    let b_side = b.open("a", ConnectionDirection::Inbound);
    pump(&mut a, &a_side, &mut b, &b_side);

    a.time.set(5_000);
    b.time.set(5_020);
    let nonce = a.node.ping(&PeerId::new("b")).unwrap();
    a.time.set(5_040);
    pump(&mut a, &a_side, &mut b, &b_side);

    let record = a.node.registry().get(&PeerId::new("b")).unwrap();
    assert_eq!(record.last_latency_ms, Some(20));
    assert_eq!(record.last_ping_at, Some(Timestamp::from_millis(5_040)));
    assert!(!nonce.is_empty());
}

// =============================================================================
// DISPATCH
// =============================================================================

#[test]
fn test_unknown_type_gets_one_error_and_no_side_effects() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.compatible_peer("b");
    let before = node.node.registry().get(&PeerId::new("b")).unwrap().summary();

    node.time.advance(1_000);
    node.deliver_raw("b", &connection, json!({"type": "FOO", "payload": {}}));

    match &connection.sent()[..] {
        [P2pMessage::Error(error)] => {
            assert_eq!(error.code, UNSUPPORTED_MESSAGE_TYPE);
            assert_eq!(error.original_message_ref.as_deref(), Some("FOO"));
        }
        other => panic!("expected one ERROR, got {:?}", other),
    }
    assert!(node.app.received().is_empty());
    let after = node.node.registry().get(&PeerId::new("b")).unwrap().summary();
    assert_eq!(before, after);
}

#[test]
fn test_malformed_frames_get_error_reply() {
    struct TestCase {
        name: &'static str,
        frame: Value,
    }

    let cases = vec![
        TestCase {
            name: "not an object",
            frame: json!([1, 2, 3]),
        },
        TestCase {
            name: "missing type",
            frame: json!({"payload": {}}),
        },
        TestCase {
            name: "empty type",
            frame: json!({"type": ""}),
        },
        TestCase {
            name: "ping without nonce",
            frame: json!({"type": "PING", "payload": {"timestamp": 1}}),
        },
    ];

    for case in cases {
        let mut node = harness(NodeConfig::for_testing("a"));
        let connection = node.compatible_peer("b");
        node.deliver_raw("b", &connection, case.frame);

        let errors = connection.sent_of_type(MessageType::Error);
        assert_eq!(errors.len(), 1, "{}", case.name);
        match &errors[0] {
            P2pMessage::Error(error) => assert_eq!(error.code, MALFORMED_MESSAGE, "{}", case.name),
            _ => unreachable!(),
        }
        assert_eq!(connection.sent_count(), 1, "{}", case.name);
    }
}

#[test]
fn test_delegated_messages_reach_application_with_reply() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.compatible_peer("b");
    node.app.reply_to(
        MessageType::GetPeers,
        P2pMessage::PeersResponse(OpaquePayload::new(json!({"peers": ["c"]}))),
    );

    node.deliver_raw("b", &connection, json!({"type": "GET_PEERS"}));
    node.deliver("b", &connection, &tx_broadcast());

    let received = node.app.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].0, PeerId::new("b"));
    assert_eq!(connection.sent_of_type(MessageType::PeersResponse).len(), 1);
    assert_eq!(connection.sent_count(), 1);
}

#[test]
fn test_valid_message_updates_last_seen() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.compatible_peer("b");
    node.time.set(9_000);

    node.deliver("b", &connection, &tx_broadcast());

    let record = node.node.registry().get(&PeerId::new("b")).unwrap();
    assert_eq!(record.last_seen_at, Timestamp::from_millis(9_000));
}

// =============================================================================
// PROPOSAL CONFLICT
// =============================================================================

#[test]
fn test_candidate_announcement_abandons_local_proposal() {
    let mut node = harness(NodeConfig::for_testing("a"));
    let connection = node.compatible_peer("b");
    node.node.proposal_flag().set(true);

    node.deliver("b", &connection, &candidate());
    assert!(!node.node.proposal_flag().is_proposing());

    node.deliver("b", &connection, &candidate());
    assert!(!node.node.proposal_flag().is_proposing());

    assert_eq!(
        node.app
            .received_of_type(MessageType::AnnounceCandidateBlock)
            .len(),
        2
    );
}

// =============================================================================
// RUNTIME
// =============================================================================

fn runtime_ports(transport: Arc<MockTransport>, discovered: Vec<&str>) -> NodePorts {
    ports_with(
        transport,
        discovered.into_iter().map(PeerId::new).collect(),
        Arc::new(FixedTimeSource::new(1_000)),
        Arc::new(RecordingApplication::new()),
    )
}

#[tokio::test]
async fn test_start_times_out_when_transport_hangs() {
    let transport = Arc::new(MockTransport::with_start_behaviour(StartBehaviour::Hang));
    let config = NodeConfig::for_testing("a").with_open_timeout(Duration::from_millis(20));

    let result = P2pNode::start(config, runtime_ports(transport, vec!["b"])).await;

    assert_eq!(result.err(), Some(NodeError::StartupTimeout { timeout_ms: 20 }));
}

#[tokio::test]
async fn test_start_fails_when_transport_fails() {
    let transport = Arc::new(MockTransport::with_start_behaviour(StartBehaviour::Fail(
        "port in use".into(),
    )));

    let result = P2pNode::start(
        NodeConfig::for_testing("a"),
        runtime_ports(transport.clone(), vec!["b"]),
    )
    .await;

    assert_eq!(
        result.err(),
        Some(NodeError::Transport(TransportError::InitFailed("port in use".into())))
    );
    assert!(transport.connection(&PeerId::new("b")).is_none());
}

#[tokio::test]
async fn test_start_rejects_invalid_config() {
    let transport = Arc::new(MockTransport::new());
    let result = P2pNode::start(NodeConfig::new("", "chain"), runtime_ports(transport, vec![])).await;
    assert!(matches!(result, Err(NodeError::InvalidConfig(_))));
}

async fn wait_for_peers(handle: &NodeHandle, count: usize) -> Vec<crate::domain::PeerSummary> {
    for _ in 0..100 {
        let peers = handle.peers().await.unwrap();
        if peers.len() >= count {
            return peers;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} peers", count);
}

async fn wait_for_compatible(handle: &NodeHandle) -> Vec<PeerId> {
    for _ in 0..100 {
        let peers = handle.compatible_peers().await.unwrap();
        if !peers.is_empty() {
            return peers;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Vec::new()
}

#[tokio::test]
async fn test_start_dials_discovered_peers_and_skips_failures() {
    let transport = Arc::new(MockTransport::new());
    transport.mark_unreachable("down");
    transport.mark_hanging("slow");
    let config = NodeConfig::for_testing("a").with_open_timeout(Duration::from_millis(50));

    let handle = P2pNode::start(
        config,
        runtime_ports(transport.clone(), vec!["b", "a", "down", "b", "slow"]),
    )
    .await
    .unwrap();

    let peers = wait_for_peers(&handle, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let peers_later = handle.peers().await.unwrap();

    assert_eq!(peers.len(), 1);
    assert_eq!(peers_later.len(), 1);
    assert_eq!(peers_later[0].peer_id, PeerId::new("b"));
    assert_eq!(peers_later[0].direction, ConnectionDirection::Outbound);
    let b = transport.connection(&PeerId::new("b")).unwrap();
    assert_eq!(b.sent_of_type(MessageType::Hello).len(), 1);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_handle_drives_broadcast_and_proposal_flag() {
    let transport = Arc::new(MockTransport::new());
    let handle = P2pNode::start(
        NodeConfig::for_testing("a"),
        runtime_ports(transport.clone(), vec!["b"]),
    )
    .await
    .unwrap();
    wait_for_peers(&handle, 1).await;

    // Peer b accepts our HELLO.
    let b = transport.connection(&PeerId::new("b")).unwrap();
    let accept = crate::domain::build_hello_response(
        &NodeConfig::for_testing("b"),
        &ChainHead::genesis(),
        &crate::domain::HandshakeResult::Accept,
    );
    transport
        .events()
        .unwrap()
        .emit(TransportEvent::Data {
            peer_id: PeerId::new("b"),
            connection_id: b.id(),
            message: P2pMessage::HelloResponse(accept).to_value().unwrap(),
        })
        .await
        .unwrap();

    assert_eq!(wait_for_compatible(&handle).await, vec![PeerId::new("b")]);
    let report = handle.broadcast(tx_broadcast()).await.unwrap();
    assert_eq!(report.delivered_count(), 1);

    handle.set_proposing_block(true);
    assert!(handle.is_proposing_block());
    transport
        .events()
        .unwrap()
        .emit(TransportEvent::Data {
            peer_id: PeerId::new("b"),
            connection_id: b.id(),
            message: candidate().to_value().unwrap(),
        })
        .await
        .unwrap();
    for _ in 0..100 {
        if !handle.is_proposing_block() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!handle.is_proposing_block());
    assert_eq!(handle.stats().await.unwrap().compatible, 1);

    handle.stop().await.unwrap();
    let goodbye = b.sent_of_type(MessageType::Disconnect);
    assert_eq!(goodbye.len(), 1);
    assert!(!b.is_open());
}

#[tokio::test]
async fn test_handle_after_stop_reports_not_running() {
    let transport = Arc::new(MockTransport::new());
    let handle = P2pNode::start(NodeConfig::for_testing("a"), runtime_ports(transport, vec![]))
        .await
        .unwrap();

    handle.stop().await.unwrap();

    assert_eq!(handle.peers().await.err(), Some(NodeError::NotRunning));
    assert_eq!(
        handle.connect(PeerId::new("b")).await.err(),
        Some(NodeError::NotRunning)
    );
}

#[tokio::test]
async fn test_connect_to_self_is_refused() {
    let transport = Arc::new(MockTransport::new());
    let handle = P2pNode::start(NodeConfig::for_testing("a"), runtime_ports(transport, vec![]))
        .await
        .unwrap();

    assert_eq!(
        handle.connect(PeerId::new("a")).await,
        Err(NodeError::SelfConnection(PeerId::new("a")))
    );
    handle.stop().await.unwrap();
}
