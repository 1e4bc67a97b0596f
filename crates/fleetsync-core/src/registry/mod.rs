//! Instance registry
//!
//! The registry remembers the last observed status of every instance along
//! with the generation (tick number) in which it was last seen. Entries
//! whose generation falls behind the current tick are evicted: an instance
//! missing from a single inventory listing is gone.
//!
//! ## Ownership
//!
//! The registry has no interior locking. It is owned by the
//! [`Reconciler`](crate::engine::Reconciler), which runs on a single task
//! and never overlaps ticks.
//!
//! ## Usage
//!
//! ```rust
//! use fleetsync_core::model::{Instance, InstanceState};
//! use fleetsync_core::registry::InstanceRegistry;
//!
//! let mut registry = InstanceRegistry::new();
//!
//! registry.observe(Instance::new("i-1", InstanceState::Running), 1).unwrap();
//! registry.observe(Instance::new("i-2", InstanceState::Running), 1).unwrap();
//!
//! // Only i-1 is listed on tick 2
//! registry.observe(Instance::new("i-1", InstanceState::Running), 2).unwrap();
//! let evicted = registry.evict_stale(2);
//!
//! assert_eq!(evicted, vec!["i-2".to_string()]);
//! assert!(registry.contains("i-1"));
//! ```

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::Instance;

/// A registry entry: last observed status plus the generation it was seen in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedInstance {
    /// Last observed status
    pub status: Instance,

    /// Tick number of the last observation
    pub generation: u64,
}

/// In-memory map from instance id to last observed status
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: BTreeMap<String, TrackedInstance>,
}

impl InstanceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of an instance in the given generation
    ///
    /// Creates the entry on first observation, otherwise replaces its status
    /// and restamps the generation.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The instance was not tracked before
    /// - `Ok(false)`: An existing entry was refreshed
    /// - `Err(Error::MalformedRecord)`: The record has no identifier
    pub fn observe(&mut self, instance: Instance, generation: u64) -> Result<bool> {
        if instance.id.is_empty() {
            return Err(Error::malformed_record(format!(
                "skipping instance with empty instance id (state {})",
                instance.state
            )));
        }

        match self.instances.get_mut(&instance.id) {
            Some(entry) => {
                entry.status = instance;
                entry.generation = generation;
                Ok(false)
            }
            None => {
                let id = instance.id.clone();
                self.instances.insert(
                    id,
                    TrackedInstance {
                        status: instance,
                        generation,
                    },
                );
                Ok(true)
            }
        }
    }

    /// Remove every entry not observed in `generation`
    ///
    /// # Returns
    ///
    /// The ids of the evicted instances, in id order
    pub fn evict_stale(&mut self, generation: u64) -> Vec<String> {
        let stale: Vec<String> = self
            .instances
            .iter()
            .filter(|(_, entry)| entry.generation != generation)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.instances.remove(id);
        }

        stale
    }

    /// Get an entry by id
    pub fn get(&self, id: &str) -> Option<&TrackedInstance> {
        self.instances.get(id)
    }

    /// Get a mutable entry by id
    pub fn get_mut(&mut self, id: &str) -> Option<&mut TrackedInstance> {
        self.instances.get_mut(id)
    }

    /// Check if an instance is tracked
    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// Iterate over entries in id order
    pub fn iter(&self) -> impl Iterator<Item = &TrackedInstance> {
        self.instances.values()
    }

    /// Iterate mutably over entries in id order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedInstance> {
        self.instances.values_mut()
    }

    /// Iterate over the observed statuses
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values().map(|entry| &entry.status)
    }

    /// List tracked ids
    pub fn ids(&self) -> Vec<String> {
        self.instances.keys().cloned().collect()
    }

    /// Get the number of tracked instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
