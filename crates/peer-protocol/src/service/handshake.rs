//! HELLO / HELLO_RESPONSE handling.

use tracing::{debug, info, warn};

use crate::domain::{
    build_hello, build_hello_response, verify_hello, HandshakeResult, HelloPayload,
    HelloResponsePayload, P2pMessage, PeerId, RejectReason,
};

use super::P2pNode;

impl P2pNode {
    /// Open the handshake on a connection we dialed.
    pub(crate) fn send_hello(&mut self, peer_id: &PeerId) {
        let head = self.ports.chain_state.latest_block();
        let hello = build_hello(&self.config, &head);
        debug!(peer = %peer_id, height = head.height, "sending HELLO");
        self.reply(peer_id, &P2pMessage::Hello(hello));
    }

    /// Evaluate a peer's HELLO, record the verdict and answer it.
    ///
    /// A rejected peer keeps its connection; it is only excluded from
    /// broadcast. Once rejected, a later matching HELLO is still answered
    /// with a rejection.
    pub(crate) fn handle_hello(&mut self, peer_id: &PeerId, hello: HelloPayload) {
        if hello.peer_id != *peer_id {
            debug!(peer = %peer_id, claimed = %hello.peer_id, "HELLO identity differs from connection identity");
        }

        let verdict = verify_hello(&self.config, hello.protocol_version, &hello.chain_id);
        let result = match self.registry.get_mut(peer_id) {
            Some(record) => {
                record.apply_peer_info(hello.protocol_version, &hello.capabilities, &hello.user_agent);
                let compatible = record.set_compatibility(verdict.is_accepted(), verdict.reason());
                if verdict.is_accepted() && !compatible {
                    HandshakeResult::Reject(RejectReason::PreviouslyRejected)
                } else {
                    verdict
                }
            }
            None => verdict,
        };

        match &result {
            HandshakeResult::Accept => info!(
                peer = %peer_id,
                height = hello.latest_block_height,
                user_agent = %hello.user_agent,
                "peer compatible"
            ),
            HandshakeResult::Reject(reason) => {
                warn!(peer = %peer_id, %reason, "peer incompatible, excluded from broadcast")
            }
        }

        let head = self.ports.chain_state.latest_block();
        let response = build_hello_response(&self.config, &head, &result);
        self.reply(peer_id, &P2pMessage::HelloResponse(response));
    }

    /// Adopt the peer's verdict on our HELLO.
    pub(crate) fn handle_hello_response(&mut self, peer_id: &PeerId, response: HelloResponsePayload) {
        let Some(record) = self.registry.get_mut(peer_id) else {
            return;
        };
        record.apply_peer_info(
            response.protocol_version,
            &response.capabilities,
            &response.user_agent,
        );
        let compatible = record.set_compatibility(response.accepted, response.reason.clone());

        if compatible {
            info!(peer = %peer_id, height = response.latest_block_height, "handshake accepted by peer");
        } else if response.accepted {
            warn!(peer = %peer_id, "peer accepted handshake after an earlier rejection, staying incompatible");
        } else {
            warn!(
                peer = %peer_id,
                reason = response.reason.as_deref().unwrap_or("unspecified"),
                "handshake rejected by peer"
            );
        }
    }
}
