//! Integration test: full coordination loop across three nodes.

use std::sync::Arc;

use treeline_db::TreeHeadDatabase;
use treeline_integration_tests::{ClusterHarness, eventually, sth};

/// Three nodes announce replication progress; the master computes and
/// publishes a serving head; every node reconciles it into its database
/// and election eligibility follows replication progress.
#[tokio::test]
async fn test_three_node_publish_and_reconcile() {
    let c = ClusterHarness::start(3, 2, 0.5).await;
    c.node(0).election.set_master(true);

    c.node(0).controller.new_tree_head(sth(10, 100)).await;
    c.node(1).controller.new_tree_head(sth(10, 101)).await;
    c.node(2).controller.new_tree_head(sth(8, 90)).await;

    // Two of three nodes cover size 10; the master publishes the newest
    // head at that size and the store echoes it to everyone.
    let store = Arc::clone(&c.store);
    eventually(
        move || {
            let store = Arc::clone(&store);
            async move { store.serving_sth() == Some(sth(10, 101)) }
        },
        "serving tree head published",
    )
    .await;

    for i in 0..3 {
        let db = Arc::clone(&c.node(i).db);
        eventually(
            move || {
                let db = Arc::clone(&db);
                async move { db.latest_tree_head().unwrap() == Some(sth(10, 101)) }
            },
            "serving head reconciled into the local database",
        )
        .await;
    }

    // Caught-up nodes stand for election; the lagging node stays out.
    let n0 = Arc::clone(&c.node(0).election);
    let n1 = Arc::clone(&c.node(1).election);
    let n2 = Arc::clone(&c.node(2).election);
    eventually(
        move || {
            let (n0, n1, n2) = (Arc::clone(&n0), Arc::clone(&n1), Arc::clone(&n2));
            async move { n0.participating() && n1.participating() && !n2.participating() }
        },
        "election participation to settle",
    )
    .await;

    c.shutdown().await;
}

/// A lagging node that catches up becomes eligible, and its progress
/// lets the master advance the serving head.
#[tokio::test]
async fn test_catching_up_rejoins_and_advances_serving_head() {
    let c = ClusterHarness::start(3, 3, 1.0).await;
    c.node(0).election.set_master(true);

    c.node(0).controller.new_tree_head(sth(10, 100)).await;
    c.node(1).controller.new_tree_head(sth(10, 101)).await;
    c.node(2).controller.new_tree_head(sth(8, 90)).await;

    // Full-coverage policy: only size 8 is serveable at first.
    let store = Arc::clone(&c.store);
    eventually(
        move || {
            let store = Arc::clone(&store);
            async move { store.serving_sth() == Some(sth(8, 90)) }
        },
        "initial serving head",
    )
    .await;

    // The laggard catches up; the whole cluster now covers size 10.
    c.node(2).controller.new_tree_head(sth(10, 102)).await;

    let store = Arc::clone(&c.store);
    eventually(
        move || {
            let store = Arc::clone(&store);
            async move { store.serving_sth() == Some(sth(10, 102)) }
        },
        "advanced serving head",
    )
    .await;

    let n2 = Arc::clone(&c.node(2).election);
    eventually(
        move || {
            let n2 = Arc::clone(&n2);
            async move { n2.participating() }
        },
        "caught-up node to join the election",
    )
    .await;

    c.shutdown().await;
}

/// A node that starts after the cluster is already serving picks the
/// state up from the opening watch deliveries.
#[tokio::test]
async fn test_late_joiner_reconciles_existing_serving_head() {
    let c = ClusterHarness::start(2, 1, 0.0).await;
    c.node(0).election.set_master(true);

    c.node(0).controller.new_tree_head(sth(10, 100)).await;
    c.node(1).controller.new_tree_head(sth(10, 101)).await;

    let store = Arc::clone(&c.store);
    eventually(
        move || {
            let store = Arc::clone(&store);
            async move { store.serving_sth().is_some() }
        },
        "cluster serving",
    )
    .await;

    // A third controller starts against the same store.
    let late = ClusterHarness::start_late_joiner(&c, "node-9").await;
    late.controller.new_tree_head(sth(10, 105)).await;

    let db = Arc::clone(&late.db);
    eventually(
        move || {
            let db = Arc::clone(&db);
            async move { db.latest_tree_head().unwrap().is_some() }
        },
        "late joiner reconciled",
    )
    .await;

    let election = Arc::clone(&late.election);
    eventually(
        move || {
            let election = Arc::clone(&election);
            async move { election.participating() }
        },
        "late joiner eligible",
    )
    .await;

    late.controller.shutdown().await;
    c.shutdown().await;
}
