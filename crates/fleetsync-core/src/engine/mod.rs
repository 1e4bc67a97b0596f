//! Reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Polling the inventory source
//! - Tracking instances and evicting those that disappeared
//! - Enforcing the source/destination check attribute
//! - Driving the DNS diff engine
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ InventorySource  │◄── list_instances / set_source_dest_check ──┐
//! └──────────────────┘                                             │
//!                                                                  │
//!                            ┌──────────────┐                      │
//!                            │  Reconciler  │──────────────────────┘
//!                            └──────────────┘
//!                                     │
//!         ┌───────────────────────────┼───────────────────────────┐
//!         │                           │                           │
//!         ▼                           ▼                           ▼
//! ┌─────────────────┐       ┌──────────────────┐        ┌─────────────┐
//! │InstanceRegistry │       │  DnsDiffEngine   │        │   Events    │
//! │ (observe/evict) │       │ (diff + apply)   │        │  (notify)   │
//! └─────────────────┘       └──────────────────┘        └─────────────┘
//! ```
//!
//! ## Tick Flow
//!
//! 1. Increment the tick counter
//! 2. List instances (failure aborts the tick, nothing else is touched)
//! 3. Skip records without an id
//! 4. Observe every record, stamping generation = tick
//! 5. Evict entries not stamped this tick
//! 6. Correct the source/destination check on eligible instances
//! 7. Reconcile DNS against the registry
//!
//! Per-instance failures (steps 3 and 6) are collected in the
//! [`TickReport`] and never abort the tick.
//!
//! ## Optimistic Updates
//!
//! After a successful attribute mutation the registry copy is updated in
//! place, without waiting for the next listing to confirm it. If the
//! provider reports success but does not persist the change, the registry
//! drifts until the next poll overwrites it and the mutation is reissued.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::dns::{DnsDiffEngine, DnsOutcome};
use crate::error::{Error, Result};
use crate::policy::{self, Eligibility};
use crate::registry::InstanceRegistry;
use crate::traits::{DnsApplier, DnsRecords, InstanceFilter, InventorySource};

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A tick began
    TickStarted {
        tick: u64,
    },

    /// An instance was seen for the first time
    InstanceDiscovered {
        instance_id: String,
    },

    /// An instance vanished from inventory and was evicted
    InstanceEvicted {
        instance_id: String,
    },

    /// The source/destination check was set on an instance
    SourceDestCheckCorrected {
        instance_id: String,
        enabled: bool,
    },

    /// Setting the source/destination check failed
    PolicyFailed {
        instance_id: String,
        error: String,
    },

    /// A DNS change set was applied
    DnsApplied {
        names: Vec<String>,
    },

    /// DNS was already up to date
    DnsUnchanged,

    /// A tick completed
    TickCompleted {
        tick: u64,
        instances: usize,
    },

    /// A tick failed (inventory or DNS)
    TickFailed {
        tick: u64,
        error: String,
    },

    /// The periodic driver stopped
    Stopped {
        reason: String,
    },
}

/// Summary of one successful tick
#[derive(Debug)]
pub struct TickReport {
    /// Tick number
    pub tick: u64,

    /// When the tick started
    pub started_at: DateTime<Utc>,

    /// Registry size after eviction
    pub instances: usize,

    /// Ids seen for the first time
    pub discovered: Vec<String>,

    /// Ids evicted this tick
    pub evicted: Vec<String>,

    /// Ids whose source/destination check was corrected
    pub corrected: Vec<String>,

    /// Non-fatal per-instance errors
    pub issues: Vec<Error>,

    /// DNS outcome, when a DNS applier is configured
    pub dns: Option<DnsOutcome>,
}

impl TickReport {
    fn new(tick: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            tick,
            started_at,
            instances: 0,
            discovered: Vec::new(),
            evicted: Vec::new(),
            corrected: Vec::new(),
            issues: Vec::new(),
            dns: None,
        }
    }
}

/// Core reconciliation engine
///
/// Owns the instance registry, the tick counter and (through the DNS diff
/// engine) the DNS baseline. None of these are shared: the reconciler runs
/// on one task and a tick never overlaps the next.
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Either call [`Reconciler::tick()`] directly, or hand it to a
///    [`Controller`](crate::lifecycle::Controller) for periodic driving
pub struct Reconciler {
    /// Inventory source and attribute mutator
    inventory: Box<dyn InventorySource>,

    /// DNS diff engine (absent when no DNS applier is configured)
    dns: Option<DnsDiffEngine>,

    /// Inventory scope
    filter: InstanceFilter,

    /// Desired source/destination check value
    source_dest_check: Option<bool>,

    /// Tracked instances
    registry: InstanceRegistry,

    /// Tick counter
    tick: u64,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Parameters
    ///
    /// - `inventory`: Inventory source implementation
    /// - `dns_applier`: Optional DNS applier; `None` disables DNS
    /// - `config`: Controller configuration
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields engine events
    pub fn new(
        inventory: Box<dyn InventorySource>,
        dns_applier: Option<Box<dyn DnsApplier>>,
        config: ControllerConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let reconciler = Self {
            inventory,
            dns: dns_applier.map(|applier| DnsDiffEngine::new(applier, config.tags.clone())),
            filter: config.instance_filter(),
            source_dest_check: config.source_dest_check,
            registry: InstanceRegistry::new(),
            tick: 0,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Run one full reconciliation tick
    ///
    /// # Returns
    ///
    /// - `Ok(TickReport)`: The tick completed (possibly with per-instance issues)
    /// - `Err(Error::Inventory)`: Listing failed; nothing was changed
    /// - `Err(Error::DnsApply)`: DNS apply failed after all other work
    pub async fn tick(&mut self) -> Result<TickReport> {
        self.tick += 1;
        let tick = self.tick;
        let mut report = TickReport::new(tick, Utc::now());

        self.emit_event(EngineEvent::TickStarted { tick });
        debug!("Querying {} inventory (tick {})", self.inventory.source_name(), tick);

        let listed = match self.inventory.list_instances(&self.filter).await {
            Ok(listed) => listed,
            Err(e) => {
                let err = match e {
                    Error::Inventory(_) => e,
                    other => Error::inventory(format!(
                        "{} listing failed: {}",
                        self.inventory.source_name(),
                        other
                    )),
                };
                self.emit_event(EngineEvent::TickFailed {
                    tick,
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        for instance in listed {
            let instance_id = instance.id.clone();
            match self.registry.observe(instance, tick) {
                Ok(true) => {
                    info!("Instance discovered: {:?}", instance_id);
                    self.emit_event(EngineEvent::InstanceDiscovered {
                        instance_id: instance_id.clone(),
                    });
                    report.discovered.push(instance_id);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("{}", e);
                    report.issues.push(e);
                }
            }
        }

        for instance_id in self.registry.evict_stale(tick) {
            info!("Instance deleted: {:?}", instance_id);
            self.emit_event(EngineEvent::InstanceEvicted {
                instance_id: instance_id.clone(),
            });
            report.evicted.push(instance_id);
        }

        self.enforce_source_dest_check(&mut report).await;

        report.instances = self.registry.len();
        info!("Found {} instances", report.instances);

        if let Some(dns) = self.dns.as_mut() {
            match dns.reconcile(&self.registry).await {
                Ok(outcome) => {
                    let event = match &outcome {
                        DnsOutcome::Applied { names } => EngineEvent::DnsApplied {
                            names: names.clone(),
                        },
                        DnsOutcome::Unchanged => EngineEvent::DnsUnchanged,
                    };
                    self.emit_event(event);
                    report.dns = Some(outcome);
                }
                Err(e) => {
                    self.emit_event(EngineEvent::TickFailed {
                        tick,
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }

        self.emit_event(EngineEvent::TickCompleted {
            tick,
            instances: report.instances,
        });

        Ok(report)
    }

    /// Apply the source/destination check policy to every tracked instance
    async fn enforce_source_dest_check(&mut self, report: &mut TickReport) {
        let desired = self.source_dest_check;

        for entry in self.registry.iter_mut() {
            let instance_id = entry.status.id.clone();

            match policy::eligibility(&entry.status.state) {
                Eligibility::Eligible => {}
                Eligibility::Pending => {
                    debug!("Ignoring pending instance: {:?}", instance_id);
                    continue;
                }
                Eligibility::Retiring => continue,
                Eligibility::Unknown(state) => {
                    let err = Error::unknown_state(instance_id, state);
                    warn!("{}", err);
                    report.issues.push(err);
                    continue;
                }
            }

            if !policy::needs_correction(entry.status.source_dest_check, desired) {
                continue;
            }
            let Some(enabled) = desired else {
                continue;
            };

            info!("Configuring SourceDestCheck on {:?} to {}", instance_id, enabled);

            match self
                .inventory
                .set_source_dest_check(&instance_id, enabled)
                .await
            {
                Ok(()) => {
                    entry.status.source_dest_check = Some(enabled);
                    Self::send_event(
                        &self.event_tx,
                        EngineEvent::SourceDestCheckCorrected {
                            instance_id: instance_id.clone(),
                            enabled,
                        },
                    );
                    report.corrected.push(instance_id);
                }
                Err(e) => {
                    let err = Error::policy(instance_id.clone(), e.to_string());
                    warn!("{}", err);
                    Self::send_event(
                        &self.event_tx,
                        EngineEvent::PolicyFailed {
                            instance_id,
                            error: e.to_string(),
                        },
                    );
                    report.issues.push(err);
                }
            }
        }
    }

    /// Number of ticks started so far
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Tracked instances
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    /// Last applied DNS state, if DNS is configured and has been decided
    pub fn dns_baseline(&self) -> Option<&DnsRecords> {
        self.dns.as_ref().and_then(DnsDiffEngine::baseline)
    }

    /// Log a failed tick
    ///
    /// Tick failures are reported, never escalated: the next tick retries.
    pub(crate) fn report_failure(&self, err: &Error) {
        error!("Reconciliation tick {} failed: {}", self.tick, err);
    }

    /// Emit an engine event
    pub(crate) fn emit_event(&self, event: EngineEvent) {
        Self::send_event(&self.event_tx, event);
    }

    fn send_event(tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::MemoryInventory;
    use crate::model::{Instance, InstanceState};

    #[tokio::test]
    async fn test_tick_counter_and_registry() {
        let inventory = MemoryInventory::with_instances(vec![
            Instance::new("i-1", InstanceState::Running),
            Instance::new("i-2", InstanceState::Pending),
        ]);

        let (mut reconciler, _events) =
            Reconciler::new(Box::new(inventory.clone()), None, ControllerConfig::new()).unwrap();

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.instances, 2);
        assert_eq!(report.discovered, vec!["i-1".to_string(), "i-2".to_string()]);
        assert!(report.dns.is_none());

        inventory.remove("i-2").await;
        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.tick, 2);
        assert_eq!(report.evicted, vec!["i-2".to_string()]);
        assert_eq!(reconciler.registry().ids(), vec!["i-1".to_string()]);
        assert_eq!(reconciler.tick_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_state_is_reported_not_fatal() {
        let inventory = MemoryInventory::with_instances(vec![
            Instance::new("i-1", InstanceState::from("hibernating")).with_source_dest_check(true),
            Instance::new("i-2", InstanceState::Running).with_source_dest_check(true),
        ]);

        let config = ControllerConfig::new().with_source_dest_check(false);
        let (mut reconciler, _events) =
            Reconciler::new(Box::new(inventory.clone()), None, config).unwrap();

        let report = reconciler.tick().await.unwrap();

        assert_eq!(report.issues.len(), 1);
        assert!(matches!(report.issues[0], Error::UnknownState { .. }));
        assert_eq!(report.corrected, vec!["i-2".to_string()]);
        assert_eq!(
            inventory.get("i-1").await.unwrap().source_dest_check,
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let inventory =
            MemoryInventory::with_instances(vec![Instance::new("i-1", InstanceState::Running)]);
        let (mut reconciler, mut events) =
            Reconciler::new(Box::new(inventory), None, ControllerConfig::new()).unwrap();

        reconciler.tick().await.unwrap();

        assert_eq!(events.recv().await, Some(EngineEvent::TickStarted { tick: 1 }));
        assert_eq!(
            events.recv().await,
            Some(EngineEvent::InstanceDiscovered {
                instance_id: "i-1".to_string()
            })
        );
        assert_eq!(
            events.recv().await,
            Some(EngineEvent::TickCompleted {
                tick: 1,
                instances: 1
            })
        );
    }
}
