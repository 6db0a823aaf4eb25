//! # Node Runtime
//!
//! Startup, the actor loop and the cloneable `NodeHandle`.
//!
//! The `P2pNode` lives on a single task that drains two queues: transport
//! events and API commands. Handles talk to it over `mpsc` with `oneshot`
//! replies.

use async_trait::async_trait;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::domain::{
    NodeConfig, NodeError, P2pMessage, PeerId, PeerSummary, ProposalFlag, RegistryStats,
};
use crate::ports::{BroadcastReport, EventSender, PeerNetworkApi, TransportEvent};

use super::{NodePorts, P2pNode};

/// Requests from `NodeHandle` to the actor.
pub(crate) enum NodeCommand {
    Broadcast {
        message: P2pMessage,
        reply: oneshot::Sender<BroadcastReport>,
    },
    SendTo {
        peer_id: PeerId,
        message: P2pMessage,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
    Ping {
        peer_id: PeerId,
        reply: oneshot::Sender<Result<String, NodeError>>,
    },
    Connect {
        peer_id: PeerId,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
    Disconnect {
        peer_id: PeerId,
        reason: String,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
    Peers {
        reply: oneshot::Sender<Vec<PeerSummary>>,
    },
    CompatiblePeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

impl P2pNode {
    /// Start a node.
    ///
    /// Brings up the transport within `open_timeout` (failure or timeout is
    /// fatal and leaves nothing registered), dials every discovered peer in
    /// the background and spawns the actor. Must be called inside a Tokio
    /// runtime.
    pub async fn start(config: NodeConfig, ports: NodePorts) -> Result<NodeHandle, NodeError> {
        config.validate()?;

        let (events, event_rx) = EventSender::channel(config.channel_capacity);
        let (command_tx, command_rx) = mpsc::channel(config.channel_capacity);
        let timeout_ms = config.open_timeout.as_millis() as u64;

        let started = tokio::time::timeout(
            config.open_timeout,
            ports.transport.start(&config.peer_id, events.clone()),
        )
        .await;
        match started {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(peer_id = %config.peer_id, error = %e, "transport failed to start");
                return Err(e.into());
            }
            Err(_) => {
                error!(peer_id = %config.peer_id, timeout_ms, "transport start timed out");
                ports.transport.shutdown().await;
                return Err(NodeError::StartupTimeout { timeout_ms });
            }
        }

        info!(
            peer_id = %config.peer_id,
            chain_id = %config.chain_id,
            protocol_version = config.protocol_version,
            "transport ready"
        );

        let node = P2pNode::new(config, ports, events);
        let handle = NodeHandle {
            commands: command_tx,
            proposal: node.proposal.clone(),
            local_id: node.config.peer_id.clone(),
        };

        let candidates = node.ports.discovery.discover_peers().await;
        for peer_id in node.dial_targets(candidates) {
            node.spawn_dial(peer_id);
        }

        tokio::spawn(node.run(event_rx, command_rx));
        Ok(handle)
    }

    /// Discovered peers minus ourselves and duplicates, in discovery order.
    fn dial_targets(&self, candidates: Vec<PeerId>) -> Vec<PeerId> {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|peer| !peer.is_empty() && *peer != self.config.peer_id)
            .filter(|peer| seen.insert(peer.clone()))
            .collect()
    }

    /// Dial in the background.
    ///
    /// The transport reports success as an `Opened` event; failures and
    /// timeouts are logged and leave no record.
    pub(crate) fn spawn_dial(&self, peer_id: PeerId) {
        let transport = self.ports.transport.clone();
        let events = self.events.clone();
        let timeout = self.config.open_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, transport.open(&peer_id, events)).await {
                Ok(Ok(connection)) => {
                    debug!(peer = %peer_id, connection = %connection.id(), "dial succeeded")
                }
                Ok(Err(e)) => warn!(peer = %peer_id, error = %e, "dial failed"),
                Err(_) => warn!(
                    peer = %peer_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "dial timed out"
                ),
            }
        });
    }

    /// Dial a peer on request.
    pub fn connect(&self, peer_id: PeerId) -> Result<(), NodeError> {
        if peer_id == self.config.peer_id {
            return Err(NodeError::SelfConnection(peer_id));
        }
        self.spawn_dial(peer_id);
        Ok(())
    }

    /// Actor loop. Returns after `Stop` or once every handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        mut commands: mpsc::Receiver<NodeCommand>,
    ) {
        info!(peer_id = %self.config.peer_id, "node running");

        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_transport_event(event),
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("all node handles dropped");
                        self.shutdown();
                        break;
                    }
                },
            }
        }

        self.ports.transport.shutdown().await;
        info!(peer_id = %self.config.peer_id, "node stopped");
    }

    fn handle_command(&mut self, command: NodeCommand) -> ControlFlow<()> {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            NodeCommand::Broadcast { message, reply } => {
                let _ = reply.send(self.broadcast(&message));
            }
            NodeCommand::SendTo {
                peer_id,
                message,
                reply,
            } => {
                let _ = reply.send(self.send_to(&peer_id, &message));
            }
            NodeCommand::Ping { peer_id, reply } => {
                let _ = reply.send(self.ping(&peer_id));
            }
            NodeCommand::Connect { peer_id, reply } => {
                let _ = reply.send(self.connect(peer_id));
            }
            NodeCommand::Disconnect {
                peer_id,
                reason,
                reply,
            } => {
                let _ = reply.send(self.disconnect(&peer_id, &reason));
            }
            NodeCommand::Peers { reply } => {
                let _ = reply.send(self.registry.summaries());
            }
            NodeCommand::CompatiblePeers { reply } => {
                let peers = self
                    .registry
                    .list_compatible_open()
                    .into_iter()
                    .map(|(peer_id, _)| peer_id)
                    .collect();
                let _ = reply.send(peers);
            }
            NodeCommand::Stats { reply } => {
                let _ = reply.send(self.registry.stats());
            }
            NodeCommand::Stop { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

// =============================================================================
// NODE HANDLE
// =============================================================================

/// Cloneable handle to a running node.
///
/// Every call fails with `NodeError::NotRunning` once the node has stopped.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
    proposal: ProposalFlag,
    local_id: PeerId,
}

impl NodeHandle {
    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// True while the actor is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn request<T, F>(&self, build: F) -> Result<T, NodeError>
    where
        T: Send,
        F: FnOnce(oneshot::Sender<T>) -> NodeCommand + Send,
    {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| NodeError::NotRunning)?;
        rx.await.map_err(|_| NodeError::NotRunning)
    }
}

#[async_trait]
impl PeerNetworkApi for NodeHandle {
    async fn broadcast(&self, message: P2pMessage) -> Result<BroadcastReport, NodeError> {
        self.request(|reply| NodeCommand::Broadcast { message, reply })
            .await
    }

    async fn send_to(&self, peer_id: PeerId, message: P2pMessage) -> Result<(), NodeError> {
        self.request(|reply| NodeCommand::SendTo {
            peer_id,
            message,
            reply,
        })
        .await?
    }

    async fn ping(&self, peer_id: PeerId) -> Result<String, NodeError> {
        self.request(|reply| NodeCommand::Ping { peer_id, reply })
            .await?
    }

    async fn connect(&self, peer_id: PeerId) -> Result<(), NodeError> {
        self.request(|reply| NodeCommand::Connect { peer_id, reply })
            .await?
    }

    async fn disconnect(&self, peer_id: PeerId, reason: String) -> Result<(), NodeError> {
        self.request(|reply| NodeCommand::Disconnect {
            peer_id,
            reason,
            reply,
        })
        .await?
    }

    async fn peers(&self) -> Result<Vec<PeerSummary>, NodeError> {
        self.request(|reply| NodeCommand::Peers { reply }).await
    }

    async fn compatible_peers(&self) -> Result<Vec<PeerId>, NodeError> {
        self.request(|reply| NodeCommand::CompatiblePeers { reply })
            .await
    }

    async fn stats(&self) -> Result<RegistryStats, NodeError> {
        self.request(|reply| NodeCommand::Stats { reply }).await
    }

    fn set_proposing_block(&self, proposing: bool) {
        self.proposal.set(proposing);
    }

    fn is_proposing_block(&self) -> bool {
        self.proposal.is_proposing()
    }

    async fn stop(&self) -> Result<(), NodeError> {
        self.request(|reply| NodeCommand::Stop { reply }).await
    }
}
