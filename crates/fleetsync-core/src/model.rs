//! Instance data model
//!
//! An [`Instance`] is one cloud compute resource as reported by an
//! [`InventorySource`](crate::traits::InventorySource). The lifecycle state
//! is kept as a closed enum with an `Unknown` escape hatch so that a
//! provider introducing a new state never fails deserialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a compute instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    /// A state string the controller does not recognise
    Unknown(String),
}

impl InstanceState {
    /// Provider name of this state (e.g. `"shutting-down"`)
    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for InstanceState {
    fn from(raw: &str) -> Self {
        match raw {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            other => InstanceState::Unknown(other.to_string()),
        }
    }
}

impl From<String> for InstanceState {
    fn from(raw: String) -> Self {
        InstanceState::from(raw.as_str())
    }
}

impl From<InstanceState> for String {
    fn from(state: InstanceState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compute instance as last observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Provider instance identifier (empty means the record is malformed)
    #[serde(default)]
    pub id: String,

    /// Lifecycle state
    pub state: InstanceState,

    /// Current source/destination check value, if reported
    #[serde(default)]
    pub source_dest_check: Option<bool>,

    /// Instance tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Private address, present while attached to a network
    #[serde(default)]
    pub private_ip: Option<String>,

    /// Public address, present while attached to a network
    #[serde(default)]
    pub public_ip: Option<String>,
}

impl Instance {
    /// Create a new instance record with no tags or addresses
    pub fn new(id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            id: id.into(),
            state,
            source_dest_check: None,
            tags: BTreeMap::new(),
            private_ip: None,
            public_ip: None,
        }
    }

    /// Set the reported source/destination check value
    pub fn with_source_dest_check(mut self, enabled: bool) -> Self {
        self.source_dest_check = Some(enabled);
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Set the private address
    pub fn with_private_ip(mut self, ip: impl Into<String>) -> Self {
        self.private_ip = Some(ip.into());
        self
    }

    /// Set the public address
    pub fn with_public_ip(mut self, ip: impl Into<String>) -> Self {
        self.public_ip = Some(ip.into());
        self
    }

    /// Look up a tag value
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}
