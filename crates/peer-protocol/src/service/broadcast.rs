//! Fan-out to the compatible, open peer set.

use tracing::{debug, warn};

use crate::domain::P2pMessage;
use crate::ports::BroadcastReport;

use super::P2pNode;

impl P2pNode {
    /// Send `message` to every compatible, open connection.
    ///
    /// Membership is taken from one registry snapshot. A failed send does
    /// not abort the fan-out; failed peers are removed afterwards. Delivery
    /// is not acknowledged.
    pub fn broadcast(&mut self, message: &P2pMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (peer_id, connection) in self.registry.list_compatible_open() {
            match connection.send(message) {
                Ok(()) => report.delivered.push(peer_id),
                Err(e) => {
                    warn!(peer = %peer_id, error = %e, "broadcast send failed");
                    report.failed.push(peer_id);
                }
            }
        }

        for peer_id in &report.failed {
            self.drop_peer(peer_id);
        }

        debug!(
            msg_type = %message.message_type(),
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "broadcast"
        );
        report
    }
}
