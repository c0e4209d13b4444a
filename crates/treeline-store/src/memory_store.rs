//! In-memory consistent store backend.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;
use treeline_types::{ClusterConfig, ClusterNodeState, SignedTreeHead, Update};

use crate::error::StoreError;
use crate::traits::ConsistentStore;

/// In-memory [`ConsistentStore`] backed by a single mutex.
///
/// All mutations serialize through one lock and fan out to subscribers in
/// application order, which gives the linearizable-writes / ordered-watch
/// contract within a single process. Useful for tests and for standalone
/// (single-node) deployments.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    node_states: BTreeMap<String, ClusterNodeState>,
    cluster_config: Option<ClusterConfig>,
    serving_sth: Option<SignedTreeHead>,
    node_watchers: Vec<mpsc::UnboundedSender<Vec<Update<ClusterNodeState>>>>,
    config_watchers: Vec<mpsc::UnboundedSender<Update<ClusterConfig>>>,
    sth_watchers: Vec<mpsc::UnboundedSender<Update<SignedTreeHead>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cluster-wide serving policy (an operator action).
    pub fn set_cluster_config(&self, config: ClusterConfig) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.cluster_config = Some(config);
        let update = Update::set("cluster_config", config);
        state.config_watchers.retain(|tx| tx.send(update.clone()).is_ok());
    }

    /// Remove a node's state entry (the node left the cluster).
    pub fn delete_cluster_node_state(&self, node_id: &str) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.node_states.remove(node_id);
        let batch = vec![Update::deleted(node_id)];
        state.node_watchers.retain(|tx| tx.send(batch.clone()).is_ok());
        debug!(node_id, "deleted node state");
    }

    /// Remove the serving tree head entry.
    pub fn delete_serving_sth(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.serving_sth = None;
        let update = Update::deleted("serving_sth");
        state.sth_watchers.retain(|tx| tx.send(update.clone()).is_ok());
    }

    /// Current serving tree head, if any.
    pub fn serving_sth(&self) -> Option<SignedTreeHead> {
        self.state.lock().expect("lock poisoned").serving_sth.clone()
    }

    /// Current state entry for a node, if any.
    pub fn node_state(&self, node_id: &str) -> Option<ClusterNodeState> {
        self.state
            .lock()
            .expect("lock poisoned")
            .node_states
            .get(node_id)
            .cloned()
    }

    /// Number of node state entries currently stored.
    pub fn node_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").node_states.len()
    }
}

#[async_trait::async_trait]
impl ConsistentStore for MemoryStore {
    fn watch_node_states(&self) -> mpsc::UnboundedReceiver<Vec<Update<ClusterNodeState>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("lock poisoned");
        if !state.node_states.is_empty() {
            let initial: Vec<_> = state
                .node_states
                .iter()
                .map(|(key, entry)| Update::set(key.clone(), entry.clone()))
                .collect();
            let _ = tx.send(initial);
        }
        state.node_watchers.push(tx);
        rx
    }

    fn watch_cluster_config(&self) -> mpsc::UnboundedReceiver<Update<ClusterConfig>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("lock poisoned");
        if let Some(config) = state.cluster_config {
            let _ = tx.send(Update::set("cluster_config", config));
        }
        state.config_watchers.push(tx);
        rx
    }

    fn watch_serving_sth(&self) -> mpsc::UnboundedReceiver<Update<SignedTreeHead>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("lock poisoned");
        if let Some(sth) = &state.serving_sth {
            let _ = tx.send(Update::set("serving_sth", sth.clone()));
        }
        state.sth_watchers.push(tx);
        rx
    }

    async fn set_cluster_node_state(&self, node_state: &ClusterNodeState) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state
            .node_states
            .insert(node_state.node_id.clone(), node_state.clone());
        let batch = vec![Update::set(node_state.node_id.clone(), node_state.clone())];
        state.node_watchers.retain(|tx| tx.send(batch.clone()).is_ok());
        debug!(node_id = %node_state.node_id, "set node state");
        Ok(())
    }

    async fn set_serving_sth(&self, sth: &SignedTreeHead) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.serving_sth = Some(sth.clone());
        let update = Update::set("serving_sth", sth.clone());
        state.sth_watchers.retain(|tx| tx.send(update.clone()).is_ok());
        debug!(
            tree_size = sth.tree_size,
            timestamp = sth.timestamp,
            "set serving tree head"
        );
        Ok(())
    }
}
