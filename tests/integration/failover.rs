//! Integration test: moving mastership between nodes.

use std::sync::Arc;

use treeline_integration_tests::{ClusterHarness, eventually, sth};

/// Only the current master publishes; after mastership moves, the next
/// serving head comes from the new master.
#[tokio::test]
async fn test_publishes_follow_mastership() {
    let c = ClusterHarness::start(3, 2, 0.5).await;
    c.node(0).election.set_master(true);

    c.node(0).controller.new_tree_head(sth(10, 100)).await;
    c.node(1).controller.new_tree_head(sth(10, 101)).await;
    c.node(2).controller.new_tree_head(sth(10, 102)).await;

    let store = Arc::clone(&c.store);
    eventually(
        move || {
            let store = Arc::clone(&store);
            async move { store.serving_sth() == Some(sth(10, 102)) }
        },
        "first master to publish",
    )
    .await;
    assert!(!c.node(0).probe.serving_sth_sets().is_empty());
    assert!(c.node(1).probe.serving_sth_sets().is_empty());
    assert!(c.node(2).probe.serving_sth_sets().is_empty());

    // Mastership moves to node 1; the cluster advances to a bigger tree.
    c.node(0).election.set_master(false);
    c.node(1).election.set_master(true);

    c.node(0).controller.new_tree_head(sth(12, 150)).await;
    c.node(1).controller.new_tree_head(sth(12, 151)).await;
    c.node(2).controller.new_tree_head(sth(12, 152)).await;

    let store = Arc::clone(&c.store);
    eventually(
        move || {
            let store = Arc::clone(&store);
            async move { store.serving_sth() == Some(sth(12, 152)) }
        },
        "new master to publish",
    )
    .await;

    let published_by_new_master = c.node(1).probe.serving_sth_sets();
    assert_eq!(published_by_new_master.last(), Some(&sth(12, 152)));

    // The demoted node published nothing after losing mastership.
    let published_by_old_master = c.node(0).probe.serving_sth_sets();
    assert!(published_by_old_master.iter().all(|head| head.tree_size == 10));

    c.shutdown().await;
}

/// With nobody master, candidates are computed everywhere but nothing
/// is published; granting mastership later publishes the newest
/// candidate on the next signal.
#[tokio::test]
async fn test_no_master_means_no_publishes() {
    let c = ClusterHarness::start(2, 1, 0.0).await;

    c.node(0).controller.new_tree_head(sth(10, 100)).await;
    c.node(1).controller.new_tree_head(sth(10, 101)).await;

    // Everyone has a candidate.
    for i in 0..2 {
        let controller = Arc::clone(&c.node(i).controller);
        eventually(
            move || {
                let controller = Arc::clone(&controller);
                async move { controller.calculated_serving_sth().await == Some(sth(10, 101)) }
            },
            "candidate computed",
        )
        .await;
    }

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(c.store.serving_sth(), None);

    // Grant mastership and deliver fresh progress to trigger a signal.
    c.node(0).election.set_master(true);
    c.node(0).controller.new_tree_head(sth(10, 103)).await;

    let store = Arc::clone(&c.store);
    eventually(
        move || {
            let store = Arc::clone(&store);
            async move { store.serving_sth() == Some(sth(10, 103)) }
        },
        "publish after mastership granted",
    )
    .await;

    c.shutdown().await;
}
