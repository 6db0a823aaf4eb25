//! # TCP Network Flows
//!
//! Nodes talk over real loopback sockets:
//!
//! 1. **Handshake:** matching chains converge to compatible on both sides
//! 2. **Mismatch:** a foreign chain is rejected but stays connected
//! 3. **Broadcast:** transactions reach compatible peers only
//! 4. **Proposal:** a competing candidate clears the local proposal flag
//! 5. **Liveness:** PING/PONG records latency
//! 6. **Wire errors:** unknown types get an ERROR frame back
//! 7. **Shutdown:** stop() says goodbye and peers forget the node

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use peer_protocol::{
    CandidateBlockPayload, MessageType, P2pMessage, PeerNetworkApi, TransactionPayload,
    UNSUPPORTED_MESSAGE_TYPE,
};

use super::support::{spawn_node, wait_for_peer, wait_for_removal, wait_until, TestNode};

// =============================================================================
// FIXTURES
// =============================================================================

fn transaction() -> P2pMessage {
    P2pMessage::TxBroadcast(TransactionPayload {
        transaction: json!({"from": "alice", "to": "bob", "amount": 10}),
        sender_public_key: "04ab".into(),
    })
}

/// Two nodes on `chain`, the second dialing the first, handshake complete.
async fn connected_pair(chain: &str) -> (TestNode, TestNode) {
    let a = spawn_node(chain, &[]).await;
    let b = spawn_node(chain, &[a.id.clone()]).await;
    wait_for_peer(&a.handle, &b.id, |s| s.is_compatible).await;
    wait_for_peer(&b.handle, &a.id, |s| s.is_compatible).await;
    (a, b)
}

// =============================================================================
// HANDSHAKE
// =============================================================================

#[tokio::test]
async fn test_matching_nodes_become_compatible() {
    let (a, b) = connected_pair("devnet").await;

    let seen_by_a = wait_for_peer(&a.handle, &b.id, |s| s.is_compatible).await;
    assert_eq!(seen_by_a.protocol_version, Some(1));
    assert_eq!(seen_by_a.capabilities, vec!["tx-relay".to_string()]);

    assert_eq!(a.handle.compatible_peers().await.unwrap(), vec![b.id.clone()]);
    assert_eq!(b.handle.compatible_peers().await.unwrap(), vec![a.id.clone()]);

    a.handle.stop().await.unwrap();
    b.handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_chain_mismatch_keeps_connection_but_excludes_from_broadcast() {
    let a = spawn_node("mainnet", &[]).await;
    let b = spawn_node("testnet", &[a.id.clone()]).await;

    let seen_by_b = wait_for_peer(&b.handle, &a.id, |s| s.rejection_reason.is_some()).await;
    assert!(!seen_by_b.is_compatible);
    assert!(seen_by_b.is_open);
    assert!(seen_by_b
        .rejection_reason
        .unwrap()
        .contains("chain id mismatch"));

    let seen_by_a = wait_for_peer(&a.handle, &b.id, |s| s.protocol_version.is_some()).await;
    assert!(!seen_by_a.is_compatible);

    let report = b.handle.broadcast(transaction()).await.unwrap();
    assert_eq!(report.delivered_count(), 0);
    assert_eq!(a.handle.stats().await.unwrap().total, 1);

    a.handle.stop().await.unwrap();
    b.handle.stop().await.unwrap();
}

// =============================================================================
// BROADCAST
// =============================================================================

#[tokio::test]
async fn test_broadcast_reaches_compatible_peers() {
    let hub = spawn_node("devnet", &[]).await;
    let left = spawn_node("devnet", &[hub.id.clone()]).await;
    let right = spawn_node("devnet", &[hub.id.clone()]).await;
    let stranger = spawn_node("othernet", &[hub.id.clone()]).await;

    wait_for_peer(&hub.handle, &left.id, |s| s.is_compatible).await;
    wait_for_peer(&hub.handle, &right.id, |s| s.is_compatible).await;
    wait_for_peer(&hub.handle, &stranger.id, |s| s.protocol_version.is_some()).await;

    let report = hub.handle.broadcast(transaction()).await.unwrap();
    assert_eq!(report.delivered_count(), 2);
    assert!(report.failed.is_empty());

    wait_until("left receives the transaction", || {
        left.app.received_of_type(MessageType::TxBroadcast).len() == 1
    })
    .await;
    wait_until("right receives the transaction", || {
        right.app.received_of_type(MessageType::TxBroadcast).len() == 1
    })
    .await;
    assert!(stranger.app.received_of_type(MessageType::TxBroadcast).is_empty());

    for node in [&hub, &left, &right, &stranger] {
        node.handle.stop().await.unwrap();
    }
}

// =============================================================================
// PROPOSAL CONFLICT
// =============================================================================

#[tokio::test]
async fn test_competing_candidate_abandons_local_proposal() {
    let (a, b) = connected_pair("devnet").await;
    a.handle.set_proposing_block(true);

    let announcement = P2pMessage::AnnounceCandidateBlock(CandidateBlockPayload {
        block: json!({"height": 42, "hash": "beef"}),
    });
    b.handle.broadcast(announcement).await.unwrap();

    wait_until("proposal flag cleared", || !a.handle.is_proposing_block()).await;
    wait_until("announcement delegated", || {
        a.app
            .received_of_type(MessageType::AnnounceCandidateBlock)
            .len()
            == 1
    })
    .await;

    a.handle.stop().await.unwrap();
    b.handle.stop().await.unwrap();
}

// =============================================================================
// LIVENESS
// =============================================================================

#[tokio::test]
async fn test_ping_records_latency() {
    let (a, b) = connected_pair("devnet").await;

    let nonce = a.handle.ping(b.id.clone()).await.unwrap();
    assert!(!nonce.is_empty());

    let summary = wait_for_peer(&a.handle, &b.id, |s| s.last_ping_at.is_some()).await;
    assert!(summary.last_latency_ms.is_some());

    a.handle.stop().await.unwrap();
    b.handle.stop().await.unwrap();
}

// =============================================================================
// WIRE ERRORS
// =============================================================================

#[tokio::test]
async fn test_unknown_type_gets_error_frame() {
    let node = spawn_node("devnet", &[]).await;

    let stream = TcpStream::connect(node.id.as_str()).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer
        .write_all(b"{\"peerId\":\"127.0.0.1:1\"}\n{\"type\":\"FOO\",\"payload\":{}}\n")
        .await
        .unwrap();

    let line = tokio::time::timeout(super::support::WAIT, lines.next_line())
        .await
        .expect("reply in time")
        .unwrap()
        .expect("a reply line");
    let reply: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["type"], "ERROR");
    assert_eq!(reply["payload"]["code"], UNSUPPORTED_MESSAGE_TYPE);
    assert_eq!(reply["payload"]["originalMessageRef"], "FOO");

    node.handle.stop().await.unwrap();
}

// =============================================================================
// SHUTDOWN
// =============================================================================

#[tokio::test]
async fn test_stop_disconnects_peers() {
    let (a, b) = connected_pair("devnet").await;

    b.handle.stop().await.unwrap();

    wait_for_removal(&a.handle, &b.id).await;
    assert!(a.handle.compatible_peers().await.unwrap().is_empty());
    assert!(b.handle.peers().await.is_err());

    a.handle.stop().await.unwrap();
}
