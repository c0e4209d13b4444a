//! A [`ConsistentStore`] wrapper that records and perturbs store calls.
//!
//! `ProbeStore` wraps any `Arc<dyn ConsistentStore>` and adds:
//!
//! - call logs for both setters,
//! - failure injection for `set_cluster_node_state` (the transient-fault
//!   path callers must survive),
//! - a gate that holds `set_serving_sth` mid-call until released, which
//!   lets tests prove the caller is not holding its own lock across the
//!   store write.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Semaphore, mpsc};
use treeline_types::{ClusterConfig, ClusterNodeState, SignedTreeHead, Update};

use crate::error::StoreError;
use crate::traits::ConsistentStore;

/// A [`ConsistentStore`] wrapper that records calls and injects faults.
pub struct ProbeStore {
    inner: Arc<dyn ConsistentStore>,
    node_state_sets: Mutex<Vec<ClusterNodeState>>,
    serving_sth_sets: Mutex<Vec<SignedTreeHead>>,
    fail_node_state_sets: AtomicBool,
    hold_serving_sth: AtomicBool,
    serving_sth_entered: AtomicUsize,
    serving_sth_gate: Semaphore,
}

impl ProbeStore {
    /// Wrap an existing store as a transparent pass-through.
    pub fn new(inner: Arc<dyn ConsistentStore>) -> Self {
        Self {
            inner,
            node_state_sets: Mutex::new(Vec::new()),
            serving_sth_sets: Mutex::new(Vec::new()),
            fail_node_state_sets: AtomicBool::new(false),
            hold_serving_sth: AtomicBool::new(false),
            serving_sth_entered: AtomicUsize::new(0),
            serving_sth_gate: Semaphore::new(0),
        }
    }

    /// Make subsequent `set_cluster_node_state` calls fail.
    pub fn fail_node_state_sets(&self, fail: bool) {
        self.fail_node_state_sets.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `set_serving_sth` calls block until
    /// [`release_serving_sth`](Self::release_serving_sth) is called.
    pub fn hold_serving_sth(&self, hold: bool) {
        self.hold_serving_sth.store(hold, Ordering::SeqCst);
    }

    /// Let one held `set_serving_sth` call proceed.
    pub fn release_serving_sth(&self) {
        self.serving_sth_gate.add_permits(1);
    }

    /// Number of `set_serving_sth` calls that have started (including any
    /// currently held at the gate).
    pub fn serving_sth_entered(&self) -> usize {
        self.serving_sth_entered.load(Ordering::SeqCst)
    }

    /// Node states passed to completed `set_cluster_node_state` calls.
    pub fn node_state_sets(&self) -> Vec<ClusterNodeState> {
        self.node_state_sets.lock().expect("lock poisoned").clone()
    }

    /// Tree heads passed to completed `set_serving_sth` calls.
    pub fn serving_sth_sets(&self) -> Vec<SignedTreeHead> {
        self.serving_sth_sets.lock().expect("lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl ConsistentStore for ProbeStore {
    fn watch_node_states(&self) -> mpsc::UnboundedReceiver<Vec<Update<ClusterNodeState>>> {
        self.inner.watch_node_states()
    }

    fn watch_cluster_config(&self) -> mpsc::UnboundedReceiver<Update<ClusterConfig>> {
        self.inner.watch_cluster_config()
    }

    fn watch_serving_sth(&self) -> mpsc::UnboundedReceiver<Update<SignedTreeHead>> {
        self.inner.watch_serving_sth()
    }

    async fn set_cluster_node_state(&self, state: &ClusterNodeState) -> Result<(), StoreError> {
        if self.fail_node_state_sets.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        self.inner.set_cluster_node_state(state).await?;
        self.node_state_sets
            .lock()
            .expect("lock poisoned")
            .push(state.clone());
        Ok(())
    }

    async fn set_serving_sth(&self, sth: &SignedTreeHead) -> Result<(), StoreError> {
        self.serving_sth_entered.fetch_add(1, Ordering::SeqCst);
        if self.hold_serving_sth.load(Ordering::SeqCst) {
            let permit = self
                .serving_sth_gate
                .acquire()
                .await
                .map_err(|_| StoreError::Unavailable("gate closed".into()))?;
            permit.forget();
        }
        self.inner.set_serving_sth(sth).await?;
        self.serving_sth_sets
            .lock()
            .expect("lock poisoned")
            .push(sth.clone());
        Ok(())
    }
}
