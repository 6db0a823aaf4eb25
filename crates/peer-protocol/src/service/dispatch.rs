//! Inbound message validation and routing.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{ConnectionId, DisconnectPayload, ErrorPayload, P2pMessage, PeerId};

use super::P2pNode;

impl P2pNode {
    /// Validate one inbound frame and route it.
    ///
    /// Invalid frames get exactly one ERROR reply and are never dispatched.
    /// Frames from peers without a record, or arriving on a connection the
    /// record no longer points at, are dropped.
    pub fn on_data(&mut self, peer_id: &PeerId, connection_id: ConnectionId, raw: Value) {
        if !self.registry.contains(peer_id) {
            debug!(peer = %peer_id, connection = %connection_id, "dropping frame from unregistered peer");
            return;
        }
        if !self.is_current(peer_id, connection_id) {
            debug!(peer = %peer_id, connection = %connection_id, "dropping frame from superseded connection");
            return;
        }

        let original_type = raw.get("type").and_then(Value::as_str).map(str::to_owned);
        match P2pMessage::from_value(raw) {
            Ok(message) => {
                let now = self.now();
                if let Some(record) = self.registry.get_mut(peer_id) {
                    record.last_seen_at = now;
                }
                self.dispatch(peer_id, message);
            }
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "rejecting inbound message");
                let rejection = P2pMessage::rejection(&e, original_type.as_deref());
                self.reply(peer_id, &rejection);
            }
        }
    }

    /// Route a validated message to its handler.
    pub fn dispatch(&mut self, peer_id: &PeerId, message: P2pMessage) {
        debug!(peer = %peer_id, msg_type = %message.message_type(), "dispatching");

        match message {
            P2pMessage::Hello(hello) => self.handle_hello(peer_id, hello),
            P2pMessage::HelloResponse(response) => self.handle_hello_response(peer_id, response),
            P2pMessage::Ping(ping) => self.handle_ping(peer_id, ping),
            P2pMessage::Pong(pong) => self.handle_pong(peer_id, pong),
            P2pMessage::Error(error) => self.handle_error_report(peer_id, error),
            P2pMessage::Disconnect(goodbye) => self.handle_disconnect(peer_id, goodbye),
            P2pMessage::AnnounceCandidateBlock(_) => {
                self.handle_candidate_announcement(peer_id);
                self.delegate(peer_id, &message);
            }
            P2pMessage::GetPeers(_)
            | P2pMessage::PeersResponse(_)
            | P2pMessage::GetChainState(_)
            | P2pMessage::ChainStateResponse(_)
            | P2pMessage::SendTx(_)
            | P2pMessage::TxBroadcast(_)
            | P2pMessage::BlockProposal(_)
            | P2pMessage::SendAttestation(_)
            | P2pMessage::AttestationBroadcast(_) => self.delegate(peer_id, &message),
        }
    }

    /// Hand a message to the application; send its reply, if any.
    fn delegate(&mut self, peer_id: &PeerId, message: &P2pMessage) {
        if let Some(reply) = self.ports.application.on_message(peer_id, message) {
            self.reply(peer_id, &reply);
        }
    }

    fn handle_error_report(&mut self, peer_id: &PeerId, error: ErrorPayload) {
        warn!(
            peer = %peer_id,
            code = %error.code,
            message = %error.message,
            original = ?error.original_message_ref,
            "peer reported an error"
        );
    }

    fn handle_disconnect(&mut self, peer_id: &PeerId, goodbye: DisconnectPayload) {
        if self.drop_peer(peer_id) {
            info!(peer = %peer_id, reason = %goodbye.reason, "peer disconnected");
        }
    }

    fn handle_candidate_announcement(&mut self, peer_id: &PeerId) {
        if self.proposal.abandon_on_competing_candidate() {
            info!(peer = %peer_id, "competing candidate announced, abandoning local proposal");
        } else {
            debug!(peer = %peer_id, "candidate announced, no local proposal in flight");
        }
    }
}
