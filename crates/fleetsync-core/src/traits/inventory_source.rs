// # Inventory Source Trait
//
// Defines the interface to the cloud provider's instance inventory.
//
// ## Implementations
//
// - In-memory: `fleetsync_core::inventory::MemoryInventory`
// - JSON document on disk: `fleetsync_core::inventory::FileInventory`
//
// ## Usage
//
// ```rust,ignore
// use fleetsync_core::traits::{InventorySource, InstanceFilter};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* InventorySource implementation */;
//
//     let filter = InstanceFilter::new().with_tag("KubernetesCluster", "prod");
//     for instance in source.list_instances(&filter).await? {
//         println!("{} is {}", instance.id, instance.state);
//     }
//
//     source.set_source_dest_check("i-0123", false).await?;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::model::Instance;

/// Tag filter scoping an inventory listing to one deployment
///
/// An empty filter matches every instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    /// Tags that must be present with exactly these values
    pub tags: BTreeMap<String, String>,
}

impl InstanceFilter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a tag value
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Check whether an instance carries every required tag
    pub fn matches(&self, instance: &Instance) -> bool {
        self.tags
            .iter()
            .all(|(key, value)| instance.tag(key) == Some(value.as_str()))
    }

    /// Whether the filter has no constraints
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Trait for cloud inventory implementations
///
/// Combines two capabilities of the cloud provider: listing instances and
/// mutating the source/destination check attribute. One object may serve
/// both.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Contract
///
/// - `list_instances` returns a complete snapshot. Paginated provider
///   APIs must be fully drained before returning.
/// - Neither method retries. The reconciler re-polls on its own schedule.
/// - Timeouts on remote calls are the implementation's responsibility.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List every instance matching the filter
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Instance>)`: The full current inventory
    /// - `Err(Error)`: If the inventory could not be retrieved
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<Instance>, crate::Error>;

    /// Set the source/destination check attribute of one instance
    ///
    /// # Parameters
    ///
    /// - `instance_id`: Provider instance identifier
    /// - `enabled`: Desired attribute value
    async fn set_source_dest_check(
        &self,
        instance_id: &str,
        enabled: bool,
    ) -> Result<(), crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceState;

    #[test]
    fn test_filter_matches_tags() {
        let filter = InstanceFilter::new().with_tag("KubernetesCluster", "prod");

        let ours = Instance::new("i-1", InstanceState::Running).with_tag("KubernetesCluster", "prod");
        let theirs =
            Instance::new("i-2", InstanceState::Running).with_tag("KubernetesCluster", "staging");
        let untagged = Instance::new("i-3", InstanceState::Running);

        assert!(filter.matches(&ours));
        assert!(!filter.matches(&theirs));
        assert!(!filter.matches(&untagged));
        assert!(InstanceFilter::new().matches(&untagged));
    }
}
