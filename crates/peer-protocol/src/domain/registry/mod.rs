//! # Connection Registry
//!
//! One record per live peer, keyed by peer id. A record exists iff the
//! transport reports the connection open (or just opened); close, error,
//! DISCONNECT and failed sends all remove it.
//!
//! The registry is owned by the node actor, so exactly one writer mutates
//! any given record.

mod record;

pub use record::{ConnectionRecord, PeerSummary};

use std::collections::HashMap;

use crate::domain::PeerId;
use crate::ports::ConnectionHandle;

/// Counts for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// All records
    pub total: usize,
    /// Records that passed the handshake
    pub compatible: usize,
    /// Records whose transport reports open
    pub open: usize,
}

/// Mapping `peer_id -> ConnectionRecord`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    records: HashMap<PeerId, ConnectionRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any existing record for the same peer.
    ///
    /// Returns the replaced record so the caller can close its connection.
    pub fn upsert(&mut self, record: ConnectionRecord) -> Option<ConnectionRecord> {
        self.records.insert(record.peer_id.clone(), record)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&ConnectionRecord> {
        self.records.get(peer_id)
    }

    pub fn get_mut(&mut self, peer_id: &PeerId) -> Option<&mut ConnectionRecord> {
        self.records.get_mut(peer_id)
    }

    pub fn remove(&mut self, peer_id: &PeerId) -> Option<ConnectionRecord> {
        self.records.remove(peer_id)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.records.contains_key(peer_id)
    }

    /// Authoritative broadcast membership: compatible and open.
    ///
    /// Returns owned handles so the caller can send and then remove failed
    /// peers without holding a borrow on the registry.
    pub fn list_compatible_open(&self) -> Vec<(PeerId, ConnectionHandle)> {
        let mut members: Vec<_> = self
            .records
            .values()
            .filter(|record| record.is_compatible_open())
            .map(|record| (record.peer_id.clone(), record.connection.clone()))
            .collect();
        members.sort_by(|a, b| a.0.cmp(&b.0));
        members
    }

    /// Summaries of every record, sorted by peer id
    pub fn summaries(&self) -> Vec<PeerSummary> {
        let mut summaries: Vec<_> = self.records.values().map(ConnectionRecord::summary).collect();
        summaries.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        summaries
    }

    /// Remove every record, returning them for shutdown handling
    pub fn drain(&mut self) -> Vec<ConnectionRecord> {
        self.records.drain().map(|(_, record)| record).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.records.len(),
            ..RegistryStats::default()
        };
        for record in self.records.values() {
            if record.is_compatible {
                stats.compatible += 1;
            }
            if record.is_open() {
                stats.open += 1;
            }
        }
        stats
    }
}
