// # Memory Inventory
//
// In-memory implementation of InventorySource.
//
// ## Purpose
//
// Holds a set of instances inside the process. The embedding application
// (or a test) edits the set through the handle it keeps; the reconciler
// sees the edits on its next poll.
//
// ## When to Use
//
// - Testing environments
// - Embedding the controller where inventory already lives in memory
// - Demos

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::model::Instance;
use crate::traits::inventory_source::{InstanceFilter, InventorySource};
use crate::Error;

/// In-memory inventory implementation
///
/// Instances are stored in a map keyed by id, protected by a RwLock.
/// Cloning yields another handle to the same inventory.
///
/// # Example
///
/// ```rust,no_run
/// use fleetsync_core::inventory::MemoryInventory;
/// use fleetsync_core::model::{Instance, InstanceState};
/// use fleetsync_core::traits::{InstanceFilter, InventorySource};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let inventory = MemoryInventory::new();
///
///     inventory.upsert(Instance::new("i-1", InstanceState::Running)).await;
///
///     let listed = inventory.list_instances(&InstanceFilter::new()).await?;
///     assert_eq!(listed.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryInventory {
    inner: Arc<RwLock<BTreeMap<String, Instance>>>,
}

impl MemoryInventory {
    /// Create a new empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an inventory holding the given instances
    pub fn with_instances(instances: impl IntoIterator<Item = Instance>) -> Self {
        let map = instances
            .into_iter()
            .map(|instance| (instance.id.clone(), instance))
            .collect();

        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Insert or replace an instance
    pub async fn upsert(&self, instance: Instance) {
        let mut guard = self.inner.write().await;
        guard.insert(instance.id.clone(), instance);
    }

    /// Remove an instance (it terminated and was reaped)
    pub async fn remove(&self, id: &str) -> Option<Instance> {
        let mut guard = self.inner.write().await;
        guard.remove(id)
    }

    /// Get a copy of one instance
    pub async fn get(&self, id: &str) -> Option<Instance> {
        let guard = self.inner.read().await;
        guard.get(id).cloned()
    }

    /// Get the number of instances
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the inventory is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove all instances
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.clear();
    }
}

#[async_trait]
impl InventorySource for MemoryInventory {
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<Instance>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .values()
            .filter(|instance| filter.matches(instance))
            .cloned()
            .collect())
    }

    async fn set_source_dest_check(&self, instance_id: &str, enabled: bool) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let instance = guard.get_mut(instance_id).ok_or_else(|| {
            Error::provider("memory", format!("instance {:?} not found", instance_id))
        })?;
        instance.source_dest_check = Some(enabled);
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "memory"
    }
}
