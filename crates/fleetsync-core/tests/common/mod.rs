//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call so tests can assert on how often, and
//! with what, the reconciler touched its collaborators.

#![allow(dead_code)]

use fleetsync_core::error::{Error, Result};
use fleetsync_core::model::Instance;
use fleetsync_core::traits::{DnsApplier, DnsRecords, InstanceFilter, InventorySource};
use fleetsync_core::ControllerConfig;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An inventory the test edits directly, recording every call
///
/// Unlike `MemoryInventory` it keeps records as a plain list, so tests can
/// feed it malformed entries (empty ids).
#[derive(Clone, Default)]
pub struct RecordingInventory {
    /// Instances returned by list_instances()
    instances: Arc<Mutex<Vec<Instance>>>,
    /// Call counter for list_instances()
    list_call_count: Arc<AtomicUsize>,
    /// Every set_source_dest_check() call, in order
    mutations: Arc<Mutex<Vec<(String, bool)>>>,
    /// Make list_instances() fail
    fail_listing: Arc<AtomicBool>,
    /// Ids whose mutation fails
    failing_ids: Arc<Mutex<HashSet<String>>>,
    /// Delay inside list_instances()
    list_delay: Arc<Mutex<Option<Duration>>>,
}

impl RecordingInventory {
    pub fn new(instances: Vec<Instance>) -> Self {
        let inventory = Self::default();
        inventory.set_instances(instances);
        inventory
    }

    /// Replace the listed instances
    pub fn set_instances(&self, instances: Vec<Instance>) {
        *self.instances.lock().unwrap() = instances;
    }

    /// Get the number of times list_instances() was called
    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    /// Get every mutation issued so far
    pub fn mutations(&self) -> Vec<(String, bool)> {
        self.mutations.lock().unwrap().clone()
    }

    /// Get the mutations issued for one instance
    pub fn mutations_for(&self, instance_id: &str) -> Vec<bool> {
        self.mutations
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == instance_id)
            .map(|(_, enabled)| *enabled)
            .collect()
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mutations_for(&self, instance_id: &str) {
        self.failing_ids
            .lock()
            .unwrap()
            .insert(instance_id.to_string());
    }

    pub fn clear_mutation_failures(&self) {
        self.failing_ids.lock().unwrap().clear();
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait::async_trait]
impl InventorySource for RecordingInventory {
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<Instance>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::inventory("injected listing failure"));
        }

        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .filter(|instance| filter.matches(instance))
            .cloned()
            .collect())
    }

    async fn set_source_dest_check(&self, instance_id: &str, enabled: bool) -> Result<()> {
        self.mutations
            .lock()
            .unwrap()
            .push((instance_id.to_string(), enabled));

        if self.failing_ids.lock().unwrap().contains(instance_id) {
            return Err(Error::provider("recording", "injected mutation failure"));
        }

        // Persist so the next listing observes the new value
        for instance in self.instances.lock().unwrap().iter_mut() {
            if instance.id == instance_id {
                instance.source_dest_check = Some(enabled);
            }
        }

        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "recording"
    }
}

/// A DnsApplier that records every change set it is handed
pub struct RecordingDnsApplier {
    /// Call counter for apply_changes()
    apply_call_count: Arc<AtomicUsize>,
    /// Change sets passed to apply_changes(), in order
    applied: Arc<Mutex<Vec<DnsRecords>>>,
    /// Make apply_changes() fail
    fail: Arc<AtomicBool>,
}

impl RecordingDnsApplier {
    pub fn new() -> Self {
        Self {
            apply_call_count: Arc::new(AtomicUsize::new(0)),
            applied: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the number of times apply_changes() was called
    pub fn apply_call_count(&self) -> usize {
        self.apply_call_count.load(Ordering::SeqCst)
    }

    /// Get the change sets applied so far
    pub fn applied(&self) -> Vec<DnsRecords> {
        self.applied.lock().unwrap().clone()
    }

    /// Get the most recent change set
    pub fn last_applied(&self) -> Option<DnsRecords> {
        self.applied.lock().unwrap().last().cloned()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Create a new RecordingDnsApplier that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            apply_call_count: Arc::clone(&other.apply_call_count),
            applied: Arc::clone(&other.applied),
            fail: Arc::clone(&other.fail),
        }
    }
}

#[async_trait::async_trait]
impl DnsApplier for RecordingDnsApplier {
    async fn apply_changes(&self, changes: &DnsRecords, _ttl_secs: u32) -> Result<()> {
        self.apply_call_count.fetch_add(1, Ordering::SeqCst);
        self.applied.lock().unwrap().push(changes.clone());

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::provider("recording", "injected apply failure"));
        }

        Ok(())
    }

    fn applier_name(&self) -> &'static str {
        "recording"
    }
}

/// Helper to create a minimal ControllerConfig for testing
pub fn minimal_config() -> ControllerConfig {
    ControllerConfig::new().with_sync_period_secs(1)
}

/// Build an address set
pub fn addresses(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}
