//! Collaborator traits for the fleetsync controller
//!
//! The reconciliation core depends on two external systems, both reached
//! through the abstract interfaces defined here:
//!
//! - [`InventorySource`]: List instances and mutate their attributes
//! - [`DnsApplier`]: Upsert batches of DNS address records

pub mod inventory_source;
pub mod dns_applier;

pub use inventory_source::{InventorySource, InstanceFilter};
pub use dns_applier::{DnsApplier, DnsRecords};
