//! [`ClusterStateController`] — the coordination core of a Treeline node.
//!
//! The controller maintains a live view of every peer's replication
//! progress through consistent-store watches, computes which tree head
//! the cluster should serve, decides whether this node may stand for
//! master election, reconciles the observed serving tree head with the
//! local database, and (when master) publishes new serving tree heads
//! from a dedicated background task.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use treeline_db::TreeHeadDatabase;
use treeline_election::Election;
use treeline_store::ConsistentStore;
use treeline_types::{ClusterConfig, ClusterNodeState, SignedTreeHead, Update};

use crate::peer::PeerRegistry;
use crate::serving;

/// State shared between the public API, the watch consumers and the
/// publisher, protected by one controller lock.
struct Inner {
    /// This node's own published state.
    local_node_state: ClusterNodeState,
    /// Latest serving policy observed from the store.
    cluster_config: ClusterConfig,
    /// All known peers (this node included once its state round-trips).
    peers: PeerRegistry,
    /// The tree head this node believes the cluster should serve.
    calculated_serving_sth: Option<SignedTreeHead>,
    /// The tree head the store currently reports as served.
    actual_serving_sth: Option<SignedTreeHead>,
    /// Level-triggered publish request; coalesces bursts of candidates.
    update_required: bool,
    /// Set once at shutdown; tells the publisher to exit.
    exiting: bool,
}

/// The coordination core of a Treeline node.
///
/// Construct with [`spawn`](Self::spawn); tear down with
/// [`shutdown`](Self::shutdown).
pub struct ClusterStateController {
    store: Arc<dyn ConsistentStore>,
    db: Arc<dyn TreeHeadDatabase>,
    election: Arc<dyn Election>,
    inner: Mutex<Inner>,
    /// Wakes the publisher; pairs with `Inner::update_required`.
    publish_wake: Notify,
    /// Cooperative cancellation for the watch consumer tasks.
    shutdown_tx: watch::Sender<bool>,
    /// Watch consumers plus the publisher, joined at shutdown.
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterStateController {
    /// Create the controller, subscribe the three store watches, and
    /// start the background tasks.
    pub fn spawn(
        node_id: impl Into<String>,
        store: Arc<dyn ConsistentStore>,
        db: Arc<dyn TreeHeadDatabase>,
        election: Arc<dyn Election>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);

        let controller = Arc::new(Self {
            store,
            db,
            election,
            inner: Mutex::new(Inner {
                local_node_state: ClusterNodeState {
                    node_id: node_id.into(),
                    ..Default::default()
                },
                cluster_config: ClusterConfig::default(),
                peers: PeerRegistry::new(),
                calculated_serving_sth: None,
                actual_serving_sth: None,
                update_required: false,
                exiting: false,
            }),
            publish_wake: Notify::new(),
            shutdown_tx,
            tasks: std::sync::Mutex::new(Vec::new()),
        });

        let node_states = controller.store.watch_node_states();
        let configs = controller.store.watch_cluster_config();
        let serving_sths = controller.store.watch_serving_sth();

        // Subscribe cancellation receivers before the tasks start, so a
        // shutdown issued right after spawn is never missed.
        let mut tasks = controller.tasks.lock().expect("lock poisoned");
        tasks.push(tokio::spawn(
            Arc::clone(&controller).run_node_state_watch(node_states, controller.shutdown_tx.subscribe()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&controller).run_cluster_config_watch(configs, controller.shutdown_tx.subscribe()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&controller).run_serving_sth_watch(serving_sths, controller.shutdown_tx.subscribe()),
        ));
        tasks.push(tokio::spawn(Arc::clone(&controller).run_publisher()));
        drop(tasks);

        info!("cluster state controller started");
        controller
    }

    /// Cancel the watches, stop the publisher, and wait for all
    /// background work to finish. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        {
            let mut inner = self.inner.lock().await;
            inner.exiting = true;
        }
        self.publish_wake.notify_one();

        let tasks: Vec<_> = {
            let mut tasks = self.tasks.lock().expect("lock poisoned");
            tasks.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(%e, "controller task ended abnormally");
            }
        }
        info!("cluster state controller stopped");
    }

    // ------------------------------------------------------------------
    // Public API
    // ------------------------------------------------------------------

    /// Record a newly replicated local tree head and publish the updated
    /// node state to the store.
    ///
    /// The local tree head timestamp must never regress; a regression
    /// means the replication pipeline is broken and is fatal.
    pub async fn new_tree_head(&self, sth: SignedTreeHead) {
        let mut inner = self.inner.lock().await;
        if let Some(prev) = &inner.local_node_state.newest_sth {
            assert!(
                sth.timestamp >= prev.timestamp,
                "local tree head timestamp regressed: {} < {}",
                sth.timestamp,
                prev.timestamp
            );
        }
        inner.local_node_state.newest_sth = Some(sth);
        self.push_local_node_state(&mut inner).await;
    }

    /// The tree head this node currently believes the cluster should
    /// serve, if it has computed one.
    pub async fn calculated_serving_sth(&self) -> Option<SignedTreeHead> {
        self.inner.lock().await.calculated_serving_sth.clone()
    }

    /// Copy of this node's own published state.
    pub async fn local_node_state(&self) -> ClusterNodeState {
        self.inner.lock().await.local_node_state.clone()
    }

    /// Update the endpoint this node advertises and publish the updated
    /// node state to the store.
    pub async fn set_node_host_port(&self, hostname: &str, port: u16) {
        let mut inner = self.inner.lock().await;
        inner.local_node_state.hostname = hostname.to_string();
        inner.local_node_state.log_port = port;
        self.push_local_node_state(&mut inner).await;
    }

    /// Re-evaluate election eligibility, then persist the local state.
    ///
    /// The store write happens under the controller lock: every writer of
    /// the local state serializes through this lock, so the store sees
    /// updates in order. Persist failures are transient; the next state
    /// change retries implicitly.
    async fn push_local_node_state(&self, inner: &mut Inner) {
        self.determine_election_participation(inner);
        if let Err(e) = self.store.set_cluster_node_state(&inner.local_node_state).await {
            warn!(%e, "failed to persist local node state");
        }
    }

    // ------------------------------------------------------------------
    // Watch handlers
    // ------------------------------------------------------------------

    /// Apply a batch of node-state updates, then recompute the serving
    /// tree head.
    pub(crate) async fn apply_node_state_updates(&self, updates: Vec<Update<ClusterNodeState>>) {
        let mut inner = self.inner.lock().await;
        inner.peers.apply(updates);
        self.recalculate_serving_sth(&mut inner);
    }

    /// Apply a serving-policy update, then recompute the serving tree
    /// head under the new policy.
    pub(crate) async fn apply_cluster_config_update(&self, update: Update<ClusterConfig>) {
        let mut inner = self.inner.lock().await;
        match update.entry {
            None => warn!("no cluster config exists"),
            Some(config) => {
                info!(
                    minimum_serving_nodes = config.minimum_serving_nodes,
                    minimum_serving_fraction = config.minimum_serving_fraction,
                    "received new cluster config"
                );
                inner.cluster_config = config;
                self.recalculate_serving_sth(&mut inner);
            }
        }
    }

    /// Apply a serving-tree-head update: reconcile it with the local
    /// database, record it, and re-evaluate election eligibility.
    pub(crate) async fn apply_serving_sth_update(&self, update: Update<SignedTreeHead>) {
        let mut inner = self.inner.lock().await;
        match update.entry {
            None => {
                warn!("cluster has no serving tree head");
                inner.actual_serving_sth = None;
            }
            Some(sth) => {
                if sth.timestamp == 0 {
                    warn!("ignoring invalid serving tree head update");
                    return;
                }
                info!(
                    tree_size = sth.tree_size,
                    timestamp = sth.timestamp,
                    "received new serving tree head"
                );
                self.reconcile_with_database(&sth);
                inner.actual_serving_sth = Some(sth);
            }
        }

        // The serving tree head bounds our eligibility to produce new
        // ones, so re-check election participation.
        self.determine_election_participation(&inner);
    }

    /// Check the observed serving tree head against the local database
    /// and write it through when strictly newer.
    ///
    /// The store is authoritative; any divergence from the local
    /// database signals corruption and is fatal.
    fn reconcile_with_database(&self, sth: &SignedTreeHead) {
        let mut write_sth = true;
        match self.db.latest_tree_head() {
            Ok(Some(db_sth)) => {
                debug!(
                    tree_size = db_sth.tree_size,
                    timestamp = db_sth.timestamp,
                    "local latest tree head"
                );
                assert_eq!(
                    sth.log_id, db_sth.log_id,
                    "serving tree head belongs to a different log"
                );
                assert_eq!(
                    sth.version, db_sth.version,
                    "serving tree head version differs from local database"
                );

                if db_sth.timestamp == sth.timestamp {
                    // The same head we already hold; nothing to write.
                    assert_eq!(
                        sth.tree_size, db_sth.tree_size,
                        "same-timestamp tree heads differ in size"
                    );
                    assert_eq!(
                        sth.sha256_root_hash, db_sth.sha256_root_hash,
                        "same-timestamp tree heads differ in root hash"
                    );
                    write_sth = false;
                } else {
                    assert!(
                        sth.timestamp > db_sth.timestamp,
                        "serving tree head is older than the local database"
                    );
                    assert!(
                        sth.tree_size >= db_sth.tree_size,
                        "serving tree head shrinks below the local database tree"
                    );
                }
            }
            Ok(None) => warn!("local database has no tree head, new node?"),
            Err(e) => panic!("failed to look up latest local tree head: {e}"),
        }

        if write_sth
            && let Err(e) = self.db.write_tree_head(sth)
        {
            panic!("failed to write serving tree head to local database: {e}");
        }
    }

    // ------------------------------------------------------------------
    // Serving calculation and election gating
    // ------------------------------------------------------------------

    /// Recompute the calculated serving tree head from the current peer
    /// snapshot; on a new candidate, signal the publisher if this node is
    /// master.
    fn recalculate_serving_sth(&self, inner: &mut Inner) {
        debug!("recalculating serving tree head");
        let snapshot = inner.peers.snapshot();
        let candidate = serving::calculate_serving_sth(
            &snapshot,
            &inner.cluster_config,
            inner.calculated_serving_sth.as_ref(),
            inner.actual_serving_sth.as_ref(),
        );

        match candidate {
            Some(candidate) => {
                inner.calculated_serving_sth = Some(candidate);
                if self.election.is_master() {
                    inner.update_required = true;
                    self.publish_wake.notify_one();
                }
            }
            None => warn!("failed to determine a suitable serving tree head"),
        }
    }

    /// Decide whether this node should stand in the master election.
    ///
    /// A node may only stand once the cluster has a serving tree head
    /// and local replication has caught up to it; a master that is
    /// behind could not issue new heads.
    fn determine_election_participation(&self, inner: &Inner) {
        let Some(actual) = &inner.actual_serving_sth else {
            warn!("cluster has no serving tree head, not eligible for election");
            return;
        };

        match &inner.local_node_state.newest_sth {
            None => {
                info!("no local tree head, leaving election");
                self.election.stop_election();
            }
            Some(local) if local.tree_size < actual.tree_size => {
                info!(
                    local_size = local.tree_size,
                    serving_size = actual.tree_size,
                    "local replication behind the serving tree head, leaving election"
                );
                self.election.stop_election();
            }
            Some(_) => self.election.start_election(),
        }
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    async fn run_node_state_watch(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Vec<Update<ClusterNodeState>>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                batch = rx.recv() => match batch {
                    Some(updates) => self.apply_node_state_updates(updates).await,
                    None => break,
                },
            }
        }
        debug!("node state watch stopped");
    }

    async fn run_cluster_config_watch(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Update<ClusterConfig>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                update = rx.recv() => match update {
                    Some(update) => self.apply_cluster_config_update(update).await,
                    None => break,
                },
            }
        }
        debug!("cluster config watch stopped");
    }

    async fn run_serving_sth_watch(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Update<SignedTreeHead>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                update = rx.recv() => match update {
                    Some(update) => self.apply_serving_sth_update(update).await,
                    None => break,
                },
            }
        }
        debug!("serving tree head watch stopped");
    }

    /// Publisher task: on each wake with a pending request, snapshot the
    /// calculated serving tree head, release the lock, and push the
    /// snapshot to the store if this node is master.
    ///
    /// The store write must not happen under the controller lock: it is
    /// remote I/O of unbounded latency, and its own watch echo needs the
    /// lock to be applied. Requests coalesce; only the newest candidate
    /// at wake time is published.
    async fn run_publisher(self: Arc<Self>) {
        loop {
            let sth = 'wait: loop {
                let notified = self.publish_wake.notified();
                {
                    let mut inner = self.inner.lock().await;
                    if inner.exiting {
                        debug!("publisher stopped");
                        return;
                    }
                    if inner.update_required {
                        inner.update_required = false;
                        break 'wait inner
                            .calculated_serving_sth
                            .clone()
                            .expect("publisher signalled with no calculated serving tree head");
                    }
                }
                notified.await;
            };

            if self.election.is_master() {
                info!(
                    tree_size = sth.tree_size,
                    timestamp = sth.timestamp,
                    "publishing serving tree head"
                );
                if let Err(e) = self.store.set_serving_sth(&sth).await {
                    warn!(%e, "failed to publish serving tree head");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Test hooks
    // ------------------------------------------------------------------

    /// The serving tree head last observed from the store.
    #[cfg(test)]
    pub(crate) async fn actual_serving_sth(&self) -> Option<SignedTreeHead> {
        self.inner.lock().await.actual_serving_sth.clone()
    }

    /// Number of peers currently known.
    #[cfg(test)]
    pub(crate) async fn peer_count(&self) -> usize {
        self.inner.lock().await.peers.len()
    }
}
