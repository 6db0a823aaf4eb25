//! PING / PONG.

use tracing::debug;
use uuid::Uuid;

use crate::domain::{NodeError, P2pMessage, PeerId, PingPayload, PongPayload};

use super::P2pNode;

impl P2pNode {
    /// Send a PING stamped with our clock; returns its nonce.
    pub fn ping(&mut self, peer_id: &PeerId) -> Result<String, NodeError> {
        let nonce = Uuid::new_v4().to_string();
        let ping = P2pMessage::Ping(PingPayload {
            nonce: nonce.clone(),
            timestamp: self.now(),
        });
        self.send_to(peer_id, &ping)?;
        Ok(nonce)
    }

    /// Answer with the same nonce and the latency we observed.
    ///
    /// Latency is `now - ping.timestamp`, so it assumes loosely synchronised
    /// clocks; a PING from the future reports zero.
    pub(crate) fn handle_ping(&mut self, peer_id: &PeerId, ping: PingPayload) {
        let latency = self.now().millis_since(ping.timestamp);
        let pong = P2pMessage::Pong(PongPayload {
            nonce: ping.nonce,
            latency,
        });
        self.reply(peer_id, &pong);
    }

    pub(crate) fn handle_pong(&mut self, peer_id: &PeerId, pong: PongPayload) {
        let now = self.now();
        if let Some(record) = self.registry.get_mut(peer_id) {
            record.last_ping_at = Some(now);
            record.last_latency_ms = Some(pong.latency);
        }
        debug!(peer = %peer_id, nonce = %pong.nonce, latency_ms = pong.latency, "PONG received");
    }
}
