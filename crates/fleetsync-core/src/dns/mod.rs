//! DNS diff engine
//!
//! Derives the desired DNS state from instance tags and pushes only the
//! delta against the last successfully applied state.
//!
//! ## Algorithm
//!
//! ```text
//!  registry ──► desired_snapshot() ──► compute_changes(baseline) ──► changes
//!                                                                     │
//!                                   empty? ── yes ──► Unchanged       │
//!                                     │                               │
//!                                     no ──► DnsApplier::apply_changes┘
//!                                              │
//!                         ok ──► baseline = full desired snapshot
//!                         err ─► baseline untouched (retried next tick)
//! ```
//!
//! Names that disappear from the desired snapshot are never retracted from
//! the provider; they are only logged.

use tracing::{debug, info};

use crate::config::TagConfig;
use crate::error::{Error, Result};
use crate::model::Instance;
use crate::registry::InstanceRegistry;
use crate::traits::{DnsApplier, DnsRecords};

/// Time-to-live written on every record
pub const DEFAULT_DNS_TTL_SECS: u32 = 60;

/// Result of one DNS reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOutcome {
    /// The applier was called with these names
    Applied {
        /// Names in the applied change set
        names: Vec<String>,
    },
    /// Nothing to push
    Unchanged,
}

/// Build the desired name → address mapping from instance tags
///
/// Every instance contributes, whatever its state. A tag with an empty
/// value, or a tag whose matching address is absent or empty, contributes
/// nothing.
pub fn desired_snapshot<'a>(
    instances: impl IntoIterator<Item = &'a Instance>,
    tags: &TagConfig,
) -> DnsRecords {
    let mut desired = DnsRecords::new();

    for instance in instances {
        let bindings = [
            (instance.tag(&tags.dns_internal), instance.private_ip.as_deref()),
            (instance.tag(&tags.dns_public), instance.public_ip.as_deref()),
        ];

        for (name, address) in bindings {
            if let (Some(name), Some(address)) = (name, address) {
                if !name.is_empty() && !address.is_empty() {
                    desired
                        .entry(name.to_string())
                        .or_default()
                        .insert(address.to_string());
                }
            }
        }
    }

    desired
}

/// Compute the change set between the last applied state and `desired`
///
/// With no baseline the whole desired snapshot is the change set.
/// Otherwise a name is included when its address set differs from the
/// baseline's.
pub fn compute_changes(baseline: Option<&DnsRecords>, desired: &DnsRecords) -> DnsRecords {
    let Some(baseline) = baseline else {
        return desired.clone();
    };

    desired
        .iter()
        .filter(|(name, addresses)| baseline.get(*name) != Some(*addresses))
        .map(|(name, addresses)| (name.clone(), addresses.clone()))
        .collect()
}

/// Names present in the baseline but no longer desired
pub fn stale_names(baseline: &DnsRecords, desired: &DnsRecords) -> Vec<String> {
    baseline
        .keys()
        .filter(|name| !desired.contains_key(*name))
        .cloned()
        .collect()
}

/// Applies the minimal DNS delta each tick
///
/// Owns the last-applied baseline. Like the instance registry it is only
/// touched from the reconciler's task.
pub struct DnsDiffEngine {
    /// DNS applier for pushing changes
    applier: Box<dyn DnsApplier>,

    /// Tag key names
    tags: TagConfig,

    /// Last successfully applied desired snapshot (`None` before first run)
    baseline: Option<DnsRecords>,

    /// TTL for every record
    ttl_secs: u32,
}

impl DnsDiffEngine {
    /// Create a diff engine with an empty (never applied) baseline
    pub fn new(applier: Box<dyn DnsApplier>, tags: TagConfig) -> Self {
        Self {
            applier,
            tags,
            baseline: None,
            ttl_secs: DEFAULT_DNS_TTL_SECS,
        }
    }

    /// Last applied state, if any apply decision has been made
    pub fn baseline(&self) -> Option<&DnsRecords> {
        self.baseline.as_ref()
    }

    /// Get the applier name
    pub fn applier_name(&self) -> &'static str {
        self.applier.applier_name()
    }

    /// Reconcile DNS against the current registry snapshot
    ///
    /// # Returns
    ///
    /// - `Ok(DnsOutcome)`: Applied or unchanged
    /// - `Err(Error::DnsApply)`: The applier rejected the batch
    pub async fn reconcile(&mut self, registry: &InstanceRegistry) -> Result<DnsOutcome> {
        let desired = desired_snapshot(registry.instances(), &self.tags);

        if self.baseline.is_none() && desired.is_empty() {
            debug!("No dns configuration to apply");
            self.baseline = Some(desired);
            return Ok(DnsOutcome::Unchanged);
        }

        if let Some(baseline) = &self.baseline {
            for name in stale_names(baseline, &desired) {
                debug!("DNS name {} no longer desired, leaving record in place", name);
            }
        }

        let changes = compute_changes(self.baseline.as_ref(), &desired);
        for (name, addresses) in &changes {
            let previous = self.baseline.as_ref().and_then(|b| b.get(name));
            debug!("DNS change {}: {:?} -> {:?}", name, previous, addresses);
        }

        if changes.is_empty() {
            debug!("DNS configuration unchanged");
            return Ok(DnsOutcome::Unchanged);
        }

        self.applier
            .apply_changes(&changes, self.ttl_secs)
            .await
            .map_err(|e| match e {
                Error::DnsApply(_) => e,
                other => Error::dns_apply(format!(
                    "{} rejected {} change(s): {}",
                    self.applier.applier_name(),
                    changes.len(),
                    other
                )),
            })?;

        info!("Applied DNS changes to {} name(s)", changes.len());

        self.baseline = Some(desired);
        Ok(DnsOutcome::Applied {
            names: changes.into_keys().collect(),
        })
    }
}
