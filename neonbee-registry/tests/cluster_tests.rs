//! Multi-node registry behaviour over an in-process cluster.

use neonbee_core::{ClusterMembership, NodeId, SharedData};
use neonbee_registry::{
    membership_listener, ClusterLifecycle, Reconciler, Registry, RegistryController,
};
use neonbee_storage::{LocalClusterNode, LocalSharedData};
use neonbee_test_utils::assertions::assert_same_values;
use neonbee_test_utils::fixtures::{fast_registry_config, local_cluster};
use neonbee_test_utils::FlakySharedData;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn controller(shared: Arc<dyn SharedData>, node: &LocalClusterNode) -> Arc<RegistryController> {
    Arc::new(RegistryController::new(
        node.current_node_id(),
        shared,
        fast_registry_config(),
    ))
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_departed_leader_is_cleaned_up_by_successor() {
    let shared: Arc<dyn SharedData> = Arc::new(LocalSharedData::new());
    let (cluster, nodes) = local_cluster(&["a", "b", "c"]);
    let controllers: Vec<_> = nodes
        .iter()
        .map(|node| controller(Arc::clone(&shared), node))
        .collect();

    let entities_a = controllers[0].open_registry("entities").await.unwrap();
    let entities_b = controllers[1].open_registry("entities").await.unwrap();
    entities_a.register("books", &[json!("a")]).await.unwrap();
    entities_b
        .register("books", &[json!("b"), json!("shared")])
        .await
        .unwrap();
    assert_same_values(
        &entities_b.get("books").await.unwrap(),
        &vec![json!("a"), json!("b"), json!("shared")],
    );

    let (shutdown_tx, _) = watch::channel(false);
    let mut listeners = Vec::new();
    for (node, controller) in nodes.iter().zip(&controllers).skip(1) {
        let lifecycle = Arc::new(ClusterLifecycle::new(
            Arc::clone(controller),
            Arc::new(node.clone()),
        ));
        listeners.push(tokio::spawn(membership_listener(
            lifecycle,
            node.subscribe(),
            shutdown_tx.subscribe(),
        )));
    }

    cluster.leave(&NodeId::from("a"));

    let survivor = &entities_b;
    eventually(|| async move {
        survivor.get("books").await.unwrap() == vec![json!("b"), json!("shared")]
    })
    .await;
    assert_eq!(
        controllers[2].referenced_node_ids().await.unwrap(),
        [NodeId::from("b")].into_iter().collect()
    );

    shutdown_tx.send(true).unwrap();
    for listener in listeners {
        listener.await.unwrap();
    }
}

#[tokio::test]
async fn test_reconciliation_retries_failed_cleanup_until_it_succeeds() {
    let flaky = Arc::new(FlakySharedData::new());
    let shared: Arc<dyn SharedData> = flaky.clone();
    let (cluster, nodes) = local_cluster(&["a", "b", "c"]);
    let leader = controller(Arc::clone(&shared), &nodes[0]);

    for node in &nodes[1..] {
        controller(Arc::clone(&shared), node)
            .open_registry("entities")
            .await
            .unwrap()
            .register("books", &[json!(node.current_node_id().as_str())])
            .await
            .unwrap();
    }
    cluster.evict_silently(&NodeId::from("b"));
    cluster.evict_silently(&NodeId::from("c"));

    let reconciler = Reconciler::new(Arc::clone(&leader), Arc::new(nodes[0].clone()));
    let departed: BTreeSet<NodeId> = [NodeId::from("b"), NodeId::from("c")].into_iter().collect();

    flaky.set_failing_writes(true);
    let first = reconciler.reconcile().await.unwrap();
    let second = reconciler.reconcile().await.unwrap();
    assert_eq!(first.stale, departed);
    assert_eq!(first.pending, departed);
    assert!(first.cleaned.is_empty());
    assert_eq!(second, first);
    assert_eq!(reconciler.pending(), departed);

    flaky.set_failing_writes(false);
    let recovered = reconciler.reconcile().await.unwrap();
    assert_eq!(recovered.cleaned, departed);
    assert!(recovered.pending.is_empty());
    assert!(reconciler.pending().is_empty());
    assert!(leader.referenced_node_ids().await.unwrap().is_empty());

    let entities = leader.open_registry("entities").await.unwrap();
    assert!(entities.get("books").await.unwrap().is_empty());
    assert!(reconciler.reconcile().await.unwrap().is_noop());
}

#[tokio::test]
async fn test_rejoined_node_is_not_reconciled_away() {
    let shared: Arc<dyn SharedData> = Arc::new(LocalSharedData::new());
    let (cluster, nodes) = local_cluster(&["a", "b"]);
    let leader = controller(Arc::clone(&shared), &nodes[0]);
    let entities_b = controller(Arc::clone(&shared), &nodes[1])
        .open_registry("entities")
        .await
        .unwrap();
    entities_b.register("books", &[json!("b")]).await.unwrap();

    cluster.evict_silently(&NodeId::from("b"));
    cluster.join("b");

    let reconciler = Reconciler::new(leader, Arc::new(nodes[0].clone()));
    assert!(reconciler.reconcile().await.unwrap().is_noop());
    assert_eq!(entities_b.get("books").await.unwrap(), vec![json!("b")]);
}

#[tokio::test]
async fn test_shutdown_cleanup_leaves_other_nodes_untouched() {
    let shared: Arc<dyn SharedData> = Arc::new(LocalSharedData::new());
    let (cluster, nodes) = local_cluster(&["a", "b"]);
    let controller_a = controller(Arc::clone(&shared), &nodes[0]);
    let controller_b = controller(Arc::clone(&shared), &nodes[1]);

    let health_a = controller_a.open_registry("health").await.unwrap();
    let health_b = controller_b.open_registry("health").await.unwrap();
    health_a.register("checks", &[json!("a")]).await.unwrap();
    health_b.register("checks", &[json!("b")]).await.unwrap();

    let lifecycle_b = ClusterLifecycle::new(controller_b, Arc::new(nodes[1].clone()));
    assert_eq!(lifecycle_b.on_shutdown().await.unwrap(), 1);
    cluster.leave(&NodeId::from("b"));

    assert_eq!(health_a.get("checks").await.unwrap(), vec![json!("a")]);
    assert_eq!(
        controller_a.referenced_node_ids().await.unwrap(),
        [NodeId::from("a")].into_iter().collect()
    );
}
