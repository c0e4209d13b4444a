//! Core trait for the strongly-consistent cluster store.

use tokio::sync::mpsc;
use treeline_types::{ClusterConfig, ClusterNodeState, SignedTreeHead, Update};

use crate::error::StoreError;

/// Client for the strongly-consistent, watch-capable store that holds
/// cluster-wide state.
///
/// Watch contracts:
///
/// - Deliveries on one stream arrive in the order the store applied them.
/// - Streams are independent; no ordering holds across streams.
/// - A new watch first delivers the current state: all existing node
///   states as one batch, and the cluster config / serving tree head as a
///   single update when present.
/// - A stream ends (the channel closes) when the store goes away.
///
/// All implementations must be `Send + Sync`; writes are linearizable.
#[async_trait::async_trait]
pub trait ConsistentStore: Send + Sync {
    /// Subscribe to per-node cluster state. Each delivery is a batch of
    /// updates applied in order.
    fn watch_node_states(&self) -> mpsc::UnboundedReceiver<Vec<Update<ClusterNodeState>>>;

    /// Subscribe to the cluster-wide serving policy.
    fn watch_cluster_config(&self) -> mpsc::UnboundedReceiver<Update<ClusterConfig>>;

    /// Subscribe to the cluster's serving tree head.
    fn watch_serving_sth(&self) -> mpsc::UnboundedReceiver<Update<SignedTreeHead>>;

    /// Publish this node's state, keyed by `state.node_id`.
    async fn set_cluster_node_state(&self, state: &ClusterNodeState) -> Result<(), StoreError>;

    /// Publish a new serving tree head for the whole cluster.
    async fn set_serving_sth(&self, sth: &SignedTreeHead) -> Result<(), StoreError>;
}
