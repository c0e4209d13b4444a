//! Peer tracking: one [`ClusterPeer`] per known node, indexed by node id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;
use treeline_client::LogClient;
use treeline_types::{ClusterNodeState, Update};

/// A peer node in the cluster.
///
/// Holds the peer's last-known state and a log client bound to the
/// endpoint the state was announced with. The state lock is a leaf: it is
/// never held while acquiring the controller lock. The client is built
/// once; a peer whose endpoint changes is replaced wholesale rather than
/// mutated (see [`PeerRegistry::apply`]).
pub struct ClusterPeer {
    state: Mutex<ClusterNodeState>,
    client: LogClient,
}

impl ClusterPeer {
    /// Create a peer from its announced state, building a log client for
    /// the announced endpoint.
    pub fn new(state: ClusterNodeState) -> Arc<Self> {
        let client = LogClient::new(&state.hostname, state.log_port);
        Arc::new(Self {
            state: Mutex::new(state),
            client,
        })
    }

    /// Tree size of the peer's newest replicated head, if it has one.
    pub fn tree_size(&self) -> Option<u64> {
        self.state.lock().expect("lock poisoned").newest_tree_size()
    }

    /// Copy of the peer's last-known state.
    pub fn state(&self) -> ClusterNodeState {
        self.state.lock().expect("lock poisoned").clone()
    }

    /// The endpoint this peer was announced with.
    pub fn host_port(&self) -> (String, u16) {
        let state = self.state.lock().expect("lock poisoned");
        (state.hostname.clone(), state.log_port)
    }

    /// The log client bound to this peer's endpoint.
    pub fn client(&self) -> &LogClient {
        &self.client
    }

    /// Replace the stored state with a newer announcement.
    ///
    /// The endpoint must be unchanged; an endpoint change requires
    /// replacing the peer so the client is rebuilt.
    fn update_state(&self, new_state: ClusterNodeState) {
        let mut state = self.state.lock().expect("lock poisoned");
        assert_eq!(
            state.hostname, new_state.hostname,
            "peer state update changed hostname in place"
        );
        assert_eq!(
            state.log_port, new_state.log_port,
            "peer state update changed log port in place"
        );
        *state = new_state;
    }
}

/// Indexed set of known peers, keyed by node id.
///
/// Mutated only under the controller lock; hands out immutable state
/// snapshots for the serving calculation.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<String, Arc<ClusterPeer>>,
}

impl PeerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of watch updates in delivery order.
    ///
    /// A node whose announced endpoint changed is evicted and re-created
    /// so its log client is rebuilt. Removal of a node that is not
    /// present means our view has diverged from the store, which is
    /// fatal.
    pub fn apply(&mut self, updates: Vec<Update<ClusterNodeState>>) {
        for update in updates {
            let node_id = update.key;
            match update.entry {
                Some(state) => {
                    debug!(node_id = %node_id, "node joined or updated");

                    let endpoint_changed = self.peers.get(&node_id).is_some_and(|peer| {
                        peer.host_port() != (state.hostname.clone(), state.log_port)
                    });
                    if endpoint_changed {
                        self.peers.remove(&node_id);
                    }

                    match self.peers.get(&node_id) {
                        Some(peer) => peer.update_state(state),
                        None => {
                            self.peers.insert(node_id, ClusterPeer::new(state));
                        }
                    }
                }
                None => {
                    debug!(node_id = %node_id, "node left");
                    assert!(
                        self.peers.remove(&node_id).is_some(),
                        "departed node {node_id} was not in the registry"
                    );
                }
            }
        }
    }

    /// Copies of all current peer states (including peers with no tree
    /// head yet).
    pub fn snapshot(&self) -> Vec<ClusterNodeState> {
        self.peers.values().map(|peer| peer.state()).collect()
    }

    /// Look up a peer by node id.
    pub fn get(&self, node_id: &str) -> Option<&Arc<ClusterPeer>> {
        self.peers.get(node_id)
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
