//! Contract Test: Shutdown Determinism
//!
//! Constraints verified:
//! - Exactly one of any number of concurrent stop requests succeeds
//! - run() returns promptly once stop is requested
//! - An in-flight tick completes before run() returns
//! - The driver keeps ticking through failed ticks
//! - The driver cannot be started twice
//!
//! If this test fails, someone has added:
//! - A shutdown path that can fire twice
//! - Tasks that ignore the stop signal
//! - Error escalation that kills the loop

mod common;

use common::*;
use fleetsync_core::engine::EngineEvent;
use fleetsync_core::model::{Instance, InstanceState};
use fleetsync_core::{Controller, Error, Reconciler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

fn controller_for(inventory: &RecordingInventory, period: Duration) -> Controller {
    let (reconciler, _events) =
        Reconciler::new(Box::new(inventory.clone()), None, minimal_config())
            .expect("reconciler construction succeeds");
    Controller::new(reconciler, period).expect("controller construction succeeds")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stops_succeed_exactly_once() {
    const STOPPERS: usize = 16;

    let inventory = RecordingInventory::new(Vec::new());
    let controller = Arc::new(controller_for(&inventory, Duration::from_millis(20)));
    let mut signal = controller.shutdown_signal();

    let runner = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run().await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;

    // Release every stopper at once so the calls race across workers
    let barrier = Arc::new(Barrier::new(STOPPERS));
    let mut stoppers = Vec::new();
    for _ in 0..STOPPERS {
        let controller = Arc::clone(&controller);
        let barrier = Arc::clone(&barrier);
        stoppers.push(tokio::spawn(async move {
            barrier.wait().await;
            controller.stop()
        }));
    }

    let mut succeeded = 0;
    let mut already_stopping = 0;
    for stopper in stoppers {
        match stopper.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(Error::AlreadyStopping) => already_stopping += 1,
            Err(other) => panic!("unexpected stop error: {:?}", other),
        }
    }

    assert_eq!(succeeded, 1, "exactly one stop should initiate shutdown");
    assert_eq!(already_stopping, STOPPERS - 1);

    // The shutdown signal flips to true once and never fires again
    tokio::time::timeout(Duration::from_secs(5), signal.changed())
        .await
        .expect("shutdown signal should fire")
        .unwrap();
    assert!(*signal.borrow_and_update());
    assert!(
        tokio::time::timeout(Duration::from_millis(100), signal.changed())
            .await
            .is_err(),
        "the shutdown signal should be sent only once"
    );

    let result = tokio::time::timeout(Duration::from_secs(5), runner).await;
    assert!(result.is_ok(), "run() should return within 5 seconds");
    assert!(result.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn driver_ticks_until_stopped_then_goes_quiet() {
    let inventory = RecordingInventory::new(vec![Instance::new("i-1", InstanceState::Running)]);
    let controller = Arc::new(controller_for(&inventory, Duration::from_millis(20)));

    let runner = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run().await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(
        inventory.list_call_count() >= 2,
        "the driver should have ticked repeatedly"
    );

    controller.stop().unwrap();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("run() returns after stop")
        .unwrap()
        .unwrap();

    let after_stop = inventory.list_call_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        inventory.list_call_count(),
        after_stop,
        "no tick may run after run() returned"
    );
}

#[tokio::test]
async fn in_flight_tick_completes_before_run_returns() {
    let inventory = RecordingInventory::new(vec![Instance::new("i-1", InstanceState::Running)]);
    inventory.set_list_delay(Duration::from_millis(200));

    let (reconciler, mut events) =
        Reconciler::new(Box::new(inventory.clone()), None, minimal_config()).unwrap();
    let controller = Arc::new(Controller::new(reconciler, Duration::from_secs(30)).unwrap());

    let runner = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run().await })
    };

    // The first tick fires immediately and is now sleeping in the listing
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.stop().unwrap();

    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("run() returns after stop")
        .unwrap()
        .unwrap();

    let mut completed = false;
    let mut stopped = false;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::TickCompleted { tick: 1, .. } => {
                assert!(!stopped, "tick must complete before the driver stops");
                completed = true;
            }
            EngineEvent::Stopped { .. } => stopped = true,
            _ => {}
        }
    }

    assert!(completed, "the in-flight tick should have completed");
    assert!(stopped, "the driver should report that it stopped");
    assert_eq!(inventory.list_call_count(), 1);
}

#[tokio::test]
async fn failed_ticks_do_not_stop_the_driver() {
    let inventory = RecordingInventory::new(Vec::new());
    inventory.set_fail_listing(true);

    let controller = Arc::new(controller_for(&inventory, Duration::from_millis(20)));

    let runner = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run().await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(
        inventory.list_call_count() >= 2,
        "ticks should keep coming after a failure"
    );
    assert!(!runner.is_finished());

    controller.stop().unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), runner).await;
    assert!(result.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn stop_before_run_releases_immediately() {
    let inventory = RecordingInventory::new(Vec::new());
    let controller = controller_for(&inventory, Duration::from_secs(30));

    tokio_test::assert_ok!(controller.stop());
    assert!(controller.is_stopping());

    let result = tokio::time::timeout(Duration::from_secs(5), controller.run()).await;
    tokio_test::assert_ok!(result.expect("run() should not block"));
}

#[tokio::test]
async fn second_run_is_rejected() {
    let inventory = RecordingInventory::new(Vec::new());
    let controller = controller_for(&inventory, Duration::from_secs(30));

    controller.stop().unwrap();
    controller.run().await.unwrap();

    let err = tokio_test::assert_err!(controller.run().await);
    assert!(matches!(err, Error::AlreadyStarted));
}
