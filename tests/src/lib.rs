//! Shared test harness for Treeline integration tests.
//!
//! Provides [`ClusterHarness`] — N controllers sharing one in-memory
//! consistent store, each with its own database, probe, and scripted
//! election. This exercises the full coordination loop: node
//! announcements → peer registries → serving-head calculation → master
//! publish → store echo → reconciliation and election gating on every
//! node.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use treeline_cluster::ClusterStateController;
use treeline_db::{TreeHeadDatabase, TreeHeadDb};
use treeline_election::Election;
use treeline_store::{ConsistentStore, MemoryStore, ProbeStore};
use treeline_types::{ClusterConfig, LogId, SignedTreeHead, TreeHeadVersion};

/// Build a tree head whose root hash is a function of `(tree_size,
/// timestamp)`, so equal heads are byte-identical across nodes.
pub fn sth(tree_size: u64, timestamp: u64) -> SignedTreeHead {
    let mut root = [0u8; 32];
    root[..8].copy_from_slice(&tree_size.to_be_bytes());
    root[8..16].copy_from_slice(&timestamp.to_be_bytes());
    SignedTreeHead {
        version: TreeHeadVersion::V1,
        log_id: LogId::from([7u8; 32]),
        tree_size,
        timestamp,
        sha256_root_hash: root,
        signature: Vec::new(),
    }
}

/// Poll `condition` until it holds, panicking after ~3 seconds.
pub async fn eventually<F, Fut>(mut condition: F, what: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..600 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Election whose mastership is assigned by the test.
///
/// Start/stop track participation as usual, but `is_master` answers from
/// a flag the test controls, so scenarios can move mastership between
/// nodes deterministically.
#[derive(Default)]
pub struct ScriptedElection {
    participating: AtomicBool,
    master: AtomicBool,
}

impl ScriptedElection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_master(&self, master: bool) {
        self.master.store(master, Ordering::SeqCst);
    }

    pub fn participating(&self) -> bool {
        self.participating.load(Ordering::SeqCst)
    }
}

impl Election for ScriptedElection {
    fn start_election(&self) {
        self.participating.store(true, Ordering::SeqCst);
    }

    fn stop_election(&self) {
        self.participating.store(false, Ordering::SeqCst);
    }

    fn is_master(&self) -> bool {
        self.master.load(Ordering::SeqCst)
    }
}

/// One node of the harness cluster.
pub struct HarnessNode {
    pub node_id: String,
    pub db: Arc<TreeHeadDb>,
    pub probe: Arc<ProbeStore>,
    pub election: Arc<ScriptedElection>,
    pub controller: Arc<ClusterStateController>,
}

/// N controllers over one shared consistent store.
pub struct ClusterHarness {
    pub store: Arc<MemoryStore>,
    pub nodes: Vec<HarnessNode>,
}

impl ClusterHarness {
    /// Start `n` controllers sharing a store carrying the given serving
    /// policy. Each node announces its endpoint immediately.
    pub async fn start(n: usize, minimum_serving_nodes: u64, minimum_serving_fraction: f64) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.set_cluster_config(ClusterConfig {
            minimum_serving_nodes,
            minimum_serving_fraction,
        });

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let node_id = format!("node-{i}");
            let db = Arc::new(TreeHeadDb::in_memory());
            let probe = Arc::new(ProbeStore::new(
                Arc::clone(&store) as Arc<dyn ConsistentStore>
            ));
            let election = Arc::new(ScriptedElection::new());

            let controller = ClusterStateController::spawn(
                node_id.clone(),
                Arc::clone(&probe) as Arc<dyn ConsistentStore>,
                Arc::clone(&db) as Arc<dyn TreeHeadDatabase>,
                Arc::clone(&election) as Arc<dyn Election>,
            );
            controller
                .set_node_host_port(&format!("node-{i}.example.com"), 6962)
                .await;

            nodes.push(HarnessNode {
                node_id,
                db,
                probe,
                election,
                controller,
            });
        }

        Self { store, nodes }
    }

    pub fn node(&self, i: usize) -> &HarnessNode {
        &self.nodes[i]
    }

    /// Start one more controller against an existing harness's store,
    /// as a node joining a running cluster would.
    pub async fn start_late_joiner(harness: &Self, node_id: &str) -> HarnessNode {
        let db = Arc::new(TreeHeadDb::in_memory());
        let probe = Arc::new(ProbeStore::new(
            Arc::clone(&harness.store) as Arc<dyn ConsistentStore>
        ));
        let election = Arc::new(ScriptedElection::new());

        let controller = ClusterStateController::spawn(
            node_id,
            Arc::clone(&probe) as Arc<dyn ConsistentStore>,
            Arc::clone(&db) as Arc<dyn TreeHeadDatabase>,
            Arc::clone(&election) as Arc<dyn Election>,
        );
        controller
            .set_node_host_port(&format!("{node_id}.example.com"), 6962)
            .await;

        HarnessNode {
            node_id: node_id.to_string(),
            db,
            probe,
            election,
            controller,
        }
    }

    /// Shut every controller down.
    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.controller.shutdown().await;
        }
    }
}
