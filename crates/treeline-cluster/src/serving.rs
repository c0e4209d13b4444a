//! Serving tree head selection.
//!
//! A tree head is eligible for serving when enough of the cluster has
//! replicated at least as many leaves: every node whose newest head
//! covers `s` leaves can also serve any prefix of size `s' <= s`, so
//! scanning advertised sizes from largest to smallest gives a running
//! lower bound on how many nodes can serve each size.

use std::collections::BTreeMap;

use tracing::{debug, info};
use treeline_types::{ClusterConfig, ClusterNodeState, SignedTreeHead};

/// Pick the tree head the cluster should serve, if any.
///
/// Scans peer-advertised tree sizes in descending order, accumulating how
/// many nodes can serve at each size, and returns the first candidate
/// satisfying the serving policy. The scan is bounded below by the
/// current calculated size (the serving tree never shrinks), and a
/// candidate must carry a strictly newer timestamp than the tree head the
/// store currently reports.
///
/// Returns `None` when no size has sufficient coverage; the current
/// calculated head then stays in effect.
pub(crate) fn calculate_serving_sth(
    peer_states: &[ClusterNodeState],
    config: &ClusterConfig,
    current_calculated: Option<&SignedTreeHead>,
    actual: Option<&SignedTreeHead>,
) -> Option<SignedTreeHead> {
    // Per advertised size: how many nodes sit at that size, and the
    // newest head seen for it. First arrival wins timestamp ties; two
    // heads with equal timestamp and size are byte-identical anyway.
    let mut buckets: BTreeMap<u64, (u64, SignedTreeHead)> = BTreeMap::new();
    for state in peer_states {
        if let Some(sth) = &state.newest_sth {
            buckets
                .entry(sth.tree_size)
                .and_modify(|(count, best)| {
                    *count += 1;
                    if sth.timestamp > best.timestamp {
                        *best = sth.clone();
                    }
                })
                .or_insert_with(|| (1, sth.clone()));
        }
    }

    // Coverage is measured against the whole cluster, including nodes
    // that have not yet replicated anything.
    let cluster_size = peer_states.len() as u64;
    let current_tree_size = current_calculated.map_or(0, |sth| sth.tree_size);

    let mut nodes_seen = 0u64;
    for (&size, (count, candidate)) in buckets.iter().rev() {
        if size < current_tree_size {
            break;
        }
        nodes_seen += count;

        let serving_fraction = nodes_seen as f64 / cluster_size as f64;
        if serving_fraction >= config.minimum_serving_fraction
            && nodes_seen >= config.minimum_serving_nodes
        {
            // Coverage suffices, but the candidate must still advance the
            // cluster-wide timestamp; otherwise keep scanning smaller
            // sizes for a newer head.
            if let Some(actual) = actual
                && candidate.timestamp <= actual.timestamp
            {
                debug!(
                    candidate_timestamp = candidate.timestamp,
                    serving_timestamp = actual.timestamp,
                    tree_size = size,
                    "discarding candidate, timestamp does not advance the serving tree head"
                );
                continue;
            }

            info!(
                tree_size = size,
                nodes = nodes_seen,
                coverage = serving_fraction,
                "cluster can serve"
            );
            return Some(candidate.clone());
        }
    }

    None
}
