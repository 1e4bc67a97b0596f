//! Minimal embedding example for fleetsync-core
//!
//! Runs the controller against an in-memory inventory, edits the inventory
//! while it runs, and prints the engine events as they arrive. The
//! application owns the lifecycle: it decides when to stop.

use fleetsync_core::model::{Instance, InstanceState};
use fleetsync_core::traits::{DnsApplier, DnsRecords};
use fleetsync_core::{
    Controller, ControllerConfig, EngineEvent, Error, MemoryInventory, Reconciler, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

/// DNS applier that only logs what it would publish
struct LoggingApplier;

#[async_trait::async_trait]
impl DnsApplier for LoggingApplier {
    async fn apply_changes(&self, changes: &DnsRecords, ttl_secs: u32) -> Result<()> {
        for (name, addresses) in changes {
            tracing::info!("[embedded] {} (ttl {}) -> {:?}", name, ttl_secs, addresses);
        }
        Ok(())
    }

    fn applier_name(&self) -> &'static str {
        "logging"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let inventory = MemoryInventory::with_instances(vec![
        Instance::new("i-1", InstanceState::Running)
            .with_source_dest_check(true)
            .with_tag("KubernetesCluster", "demo")
            .with_tag("k8s.io/dns/internal", "api.internal.example.com")
            .with_private_ip("10.0.0.5"),
        Instance::new("i-2", InstanceState::Pending)
            .with_tag("KubernetesCluster", "demo")
            .with_tag("k8s.io/dns/internal", "api.internal.example.com")
            .with_private_ip("10.0.0.6"),
    ]);

    let config = ControllerConfig::new()
        .with_cluster_id("demo")
        .with_source_dest_check(false)
        .with_sync_period_secs(1);
    let period = config.sync_period();

    let (reconciler, events) =
        Reconciler::new(Box::new(inventory.clone()), Some(Box::new(LoggingApplier)), config)?;
    let controller = Arc::new(Controller::new(reconciler, period)?);

    let printer = tokio::spawn(async move {
        let mut events = ReceiverStream::new(events);
        while let Some(event) = events.next().await {
            let done = matches!(event, EngineEvent::Stopped { .. });
            println!("event: {:?}", event);
            if done {
                break;
            }
        }
    });

    let runner = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run().await })
    };

    // Let a couple of ticks run, then bring i-2 up and retire i-1
    tokio::time::sleep(Duration::from_millis(1500)).await;
    inventory
        .upsert(
            Instance::new("i-2", InstanceState::Running)
                .with_tag("KubernetesCluster", "demo")
                .with_tag("k8s.io/dns/internal", "api.internal.example.com")
                .with_private_ip("10.0.0.6"),
        )
        .await;
    inventory.remove("i-1").await;

    tokio::time::sleep(Duration::from_millis(1500)).await;

    controller.stop()?;
    runner
        .await
        .map_err(|e| Error::Other(format!("Controller task failed: {}", e)))??;
    printer
        .await
        .map_err(|e| Error::Other(format!("Event printer failed: {}", e)))?;

    Ok(())
}
