//! Contract Test: Registry Eviction
//!
//! Constraints verified:
//! - An instance missing from one listing is evicted in that same tick
//! - Every listed instance is tracked after the tick
//! - Records without an id are skipped, never tracked
//! - A failed listing leaves the registry untouched
//!
//! If this test fails, the registry is either leaking vanished instances
//! or dropping live ones.

mod common;

use common::*;
use fleetsync_core::model::{Instance, InstanceState};
use fleetsync_core::{Error, Reconciler};

#[tokio::test]
async fn vanished_instance_is_evicted_within_one_tick() {
    let inventory = RecordingInventory::new(vec![
        Instance::new("i-1", InstanceState::Running),
        Instance::new("i-2", InstanceState::Running),
        Instance::new("i-3", InstanceState::Stopped),
    ]);

    let (mut reconciler, _events) =
        Reconciler::new(Box::new(inventory.clone()), None, minimal_config())
            .expect("reconciler construction succeeds");

    reconciler.tick().await.expect("first tick succeeds");
    assert_eq!(reconciler.registry().len(), 3);

    inventory.set_instances(vec![
        Instance::new("i-1", InstanceState::Running),
        Instance::new("i-3", InstanceState::Stopped),
    ]);

    let report = reconciler.tick().await.expect("second tick succeeds");

    assert_eq!(report.evicted, vec!["i-2".to_string()]);
    assert!(!reconciler.registry().contains("i-2"));
    assert_eq!(
        reconciler.registry().ids(),
        vec!["i-1".to_string(), "i-3".to_string()]
    );
}

#[tokio::test]
async fn every_entry_carries_the_current_generation() {
    let inventory = RecordingInventory::new(vec![
        Instance::new("i-1", InstanceState::Running),
        Instance::new("i-2", InstanceState::Pending),
    ]);

    let (mut reconciler, _events) =
        Reconciler::new(Box::new(inventory), None, minimal_config()).unwrap();

    for expected_tick in 1..=3 {
        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.tick, expected_tick);
        assert!(
            reconciler
                .registry()
                .iter()
                .all(|entry| entry.generation == expected_tick),
            "every tracked instance should be stamped with tick {}",
            expected_tick
        );
    }
}

#[tokio::test]
async fn reappearing_instance_is_rediscovered() {
    let inventory = RecordingInventory::new(vec![Instance::new("i-1", InstanceState::Running)]);

    let (mut reconciler, _events) =
        Reconciler::new(Box::new(inventory.clone()), None, minimal_config()).unwrap();

    reconciler.tick().await.unwrap();

    inventory.set_instances(Vec::new());
    let report = reconciler.tick().await.unwrap();
    assert_eq!(report.evicted, vec!["i-1".to_string()]);
    assert!(reconciler.registry().is_empty());

    inventory.set_instances(vec![Instance::new("i-1", InstanceState::Running)]);
    let report = reconciler.tick().await.unwrap();
    assert_eq!(report.discovered, vec!["i-1".to_string()]);
}

#[tokio::test]
async fn record_without_id_is_skipped() {
    let inventory = RecordingInventory::new(vec![
        Instance::new("", InstanceState::Running),
        Instance::new("i-1", InstanceState::Running),
    ]);

    let (mut reconciler, _events) =
        Reconciler::new(Box::new(inventory), None, minimal_config()).unwrap();

    let report = reconciler.tick().await.expect("tick succeeds despite bad record");

    assert_eq!(reconciler.registry().ids(), vec!["i-1".to_string()]);
    assert_eq!(report.issues.len(), 1);
    assert!(matches!(report.issues[0], Error::MalformedRecord(_)));
}

#[tokio::test]
async fn failed_listing_leaves_registry_untouched() {
    let inventory = RecordingInventory::new(vec![
        Instance::new("i-1", InstanceState::Running),
        Instance::new("i-2", InstanceState::Running),
    ]);

    let (mut reconciler, _events) =
        Reconciler::new(Box::new(inventory.clone()), None, minimal_config()).unwrap();

    reconciler.tick().await.unwrap();

    inventory.set_fail_listing(true);
    let result = reconciler.tick().await;
    assert!(matches!(result, Err(Error::Inventory(_))));

    // Nothing was evicted even though nothing was listed
    assert_eq!(reconciler.registry().len(), 2);
    assert!(reconciler.registry().iter().all(|entry| entry.generation == 1));

    // The counter still advanced; the next good tick restamps everything
    inventory.set_fail_listing(false);
    let report = reconciler.tick().await.unwrap();
    assert_eq!(report.tick, 3);
    assert!(report.evicted.is_empty());
}

#[tokio::test]
async fn cluster_filter_scopes_the_registry() {
    let inventory = RecordingInventory::new(vec![
        Instance::new("i-1", InstanceState::Running).with_tag("KubernetesCluster", "prod"),
        Instance::new("i-2", InstanceState::Running).with_tag("KubernetesCluster", "staging"),
        Instance::new("i-3", InstanceState::Running),
    ]);

    let config = minimal_config().with_cluster_id("prod");
    let (mut reconciler, _events) =
        Reconciler::new(Box::new(inventory), None, config).unwrap();

    reconciler.tick().await.unwrap();

    assert_eq!(reconciler.registry().ids(), vec!["i-1".to_string()]);
}
