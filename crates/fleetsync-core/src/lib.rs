// # fleetsync-core
//
// Core library for the fleetsync instance controller.
//
// ## Architecture Overview
//
// This library keeps a fleet of compute instances in line with policy:
// - **InventorySource**: Trait for listing instances and setting their attributes
// - **DnsApplier**: Trait for pushing A-record change sets to a DNS provider
// - **InstanceRegistry**: Generation-stamped record of the tracked instances
// - **Reconciler**: One tick of poll → evict → enforce → DNS diff
// - **Controller**: Periodic driver with exactly-once shutdown
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from cloud and DNS backends
// 2. **Level-Triggered**: Every tick recomputes from a full inventory listing
// 3. **Minimal Writes**: Attributes and DNS records are only written when they differ
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Failure Isolation**: One bad instance or tick never stops the loop

pub mod traits;
pub mod model;
pub mod registry;
pub mod policy;
pub mod dns;
pub mod engine;
pub mod lifecycle;
pub mod inventory;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{DnsApplier, DnsRecords, InstanceFilter, InventorySource};
pub use model::{Instance, InstanceState};
pub use registry::{InstanceRegistry, TrackedInstance};
pub use dns::{DnsDiffEngine, DnsOutcome};
pub use engine::{EngineEvent, Reconciler, TickReport};
pub use lifecycle::Controller;
pub use config::{ControllerConfig, TagConfig};
pub use error::{Error, Result};
pub use inventory::{FileInventory, MemoryInventory};
