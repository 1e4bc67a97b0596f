//! Configuration types for the fleetsync controller
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::traits::InstanceFilter;

/// Tag used to tell logically independent clusters in one account apart
pub const TAG_CLUSTER: &str = "KubernetesCluster";

/// Tag naming a DNS record bound to the instance's public address
pub const TAG_DNS_PUBLIC: &str = "k8s.io/dns/public";

/// Tag naming a DNS record bound to the instance's private address
pub const TAG_DNS_INTERNAL: &str = "k8s.io/dns/internal";

/// Main controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Cluster identity; when set, inventory is scoped to instances
    /// carrying `tags.cluster = cluster_id`
    #[serde(default)]
    pub cluster_id: Option<String>,

    /// Relist and reconcile this often (in seconds)
    #[serde(default = "default_sync_period_secs")]
    pub sync_period_secs: u64,

    /// Desired source/destination check value; `None` leaves it unmanaged
    #[serde(default)]
    pub source_dest_check: Option<bool>,

    /// Tag key names
    #[serde(default)]
    pub tags: TagConfig,

    /// Capacity of the engine event channel
    ///
    /// When full, events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ControllerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            cluster_id: None,
            sync_period_secs: default_sync_period_secs(),
            source_dest_check: None,
            tags: TagConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Scope inventory to one cluster
    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }

    /// Manage the source/destination check attribute
    pub fn with_source_dest_check(mut self, enabled: bool) -> Self {
        self.source_dest_check = Some(enabled);
        self
    }

    /// Set the sync period
    pub fn with_sync_period_secs(mut self, secs: u64) -> Self {
        self.sync_period_secs = secs;
        self
    }

    /// Sync period as a [`Duration`]
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    /// Inventory filter derived from the cluster identity
    pub fn instance_filter(&self) -> InstanceFilter {
        match &self.cluster_id {
            Some(cluster_id) => InstanceFilter::new().with_tag(self.tags.cluster.clone(), cluster_id.clone()),
            None => InstanceFilter::new(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sync_period_secs == 0 {
            return Err(crate::Error::config("Sync period must be > 0"));
        }

        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        if let Some(cluster_id) = &self.cluster_id {
            if cluster_id.trim().is_empty() {
                return Err(crate::Error::config("Cluster id cannot be empty when set"));
            }
        }

        self.tags.validate()?;

        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag key names read from instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagConfig {
    /// Cluster identity tag
    #[serde(default = "default_cluster_tag")]
    pub cluster: String,

    /// Tag naming the DNS record for the private address
    #[serde(default = "default_dns_internal_tag")]
    pub dns_internal: String,

    /// Tag naming the DNS record for the public address
    #[serde(default = "default_dns_public_tag")]
    pub dns_public: String,
}

impl TagConfig {
    /// Validate the tag configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.cluster.is_empty() {
            return Err(crate::Error::config("Cluster tag key cannot be empty"));
        }
        if self.dns_internal.is_empty() || self.dns_public.is_empty() {
            return Err(crate::Error::config("DNS tag keys cannot be empty"));
        }
        if self.dns_internal == self.dns_public {
            return Err(crate::Error::config(
                "Internal and public DNS tag keys must differ",
            ));
        }
        Ok(())
    }
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            cluster: default_cluster_tag(),
            dns_internal: default_dns_internal_tag(),
            dns_public: default_dns_public_tag(),
        }
    }
}

fn default_sync_period_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_cluster_tag() -> String {
    TAG_CLUSTER.to_string()
}

fn default_dns_internal_tag() -> String {
    TAG_DNS_INTERNAL.to_string()
}

fn default_dns_public_tag() -> String {
    TAG_DNS_PUBLIC.to_string()
}
