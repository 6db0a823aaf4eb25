//! # Proposal Conflict Resolution
//!
//! A node working on its own block proposal abandons it as soon as it
//! observes a peer's ANNOUNCE_CANDIDATE_BLOCK. Whichever announcement a node
//! sees first wins locally; choosing among competing candidates globally is
//! the consensus layer's job. No tie-break by height, hash or time exists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared `is_proposing_block` flag.
///
/// Clones share the same flag: the application sets it through the node
/// handle while the node actor clears it on competing announcements.
#[derive(Debug, Clone, Default)]
pub struct ProposalFlag {
    proposing: Arc<AtomicBool>,
}

impl ProposalFlag {
    /// New flag, initially not proposing
    pub fn new() -> Self {
        Self::default()
    }

    /// Set by the application when local proposal work starts or completes
    pub fn set(&self, proposing: bool) {
        self.proposing.store(proposing, Ordering::SeqCst);
    }

    pub fn is_proposing(&self) -> bool {
        self.proposing.load(Ordering::SeqCst)
    }

    /// React to a competing candidate announcement.
    ///
    /// Returns `true` if a local proposal was in flight and is now abandoned.
    /// Idempotent when no proposal is in flight.
    pub fn abandon_on_competing_candidate(&self) -> bool {
        self.proposing.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_not_proposing() {
        assert!(!ProposalFlag::new().is_proposing());
    }

    #[test]
    fn test_competing_candidate_abandons_local_proposal() {
        let flag = ProposalFlag::new();
        flag.set(true);

        assert!(flag.abandon_on_competing_candidate());
        assert!(!flag.is_proposing());
    }

    #[test]
    fn test_abandon_is_idempotent() {
        let flag = ProposalFlag::new();

        assert!(!flag.abandon_on_competing_candidate());
        assert!(!flag.abandon_on_competing_candidate());
        assert!(!flag.is_proposing());
    }

    #[test]
    fn test_clones_share_state() {
        let app_side = ProposalFlag::new();
        let node_side = app_side.clone();

        app_side.set(true);
        assert!(node_side.abandon_on_competing_candidate());
        assert!(!app_side.is_proposing());
    }
}
