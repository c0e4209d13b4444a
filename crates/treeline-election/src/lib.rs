//! Master-election contract for Treeline.
//!
//! Exactly one node at a time may publish new serving tree heads. The
//! [`Election`] trait abstracts the election primitive: nodes join or
//! leave the candidate pool and query whether they currently hold
//! mastership. A production deployment backs this with the consistent
//! store's leases; [`StandaloneElection`] covers single-node deployments
//! and tests.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// The master-election primitive.
///
/// All methods are idempotent, thread-safe, and non-blocking: joining an
/// election the node is already part of (or leaving one it is not) is a
/// no-op.
pub trait Election: Send + Sync {
    /// Join the pool of master candidates.
    fn start_election(&self);

    /// Leave the pool of master candidates, relinquishing mastership if
    /// currently held.
    fn stop_election(&self);

    /// Whether this node currently holds mastership.
    fn is_master(&self) -> bool;
}

/// Election for a cluster of one: the node is master whenever it
/// participates.
#[derive(Debug, Default)]
pub struct StandaloneElection {
    participating: AtomicBool,
}

impl StandaloneElection {
    /// Create a new election with the node not participating.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Election for StandaloneElection {
    fn start_election(&self) {
        if !self.participating.swap(true, Ordering::SeqCst) {
            info!("joined election, standalone node is master");
        }
    }

    fn stop_election(&self) {
        if self.participating.swap(false, Ordering::SeqCst) {
            info!("left election");
        }
    }

    fn is_master(&self) -> bool {
        self.participating.load(Ordering::SeqCst)
    }
}
