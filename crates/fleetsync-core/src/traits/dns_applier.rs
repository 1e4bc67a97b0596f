// # DNS Applier Trait
//
// Defines the interface for pushing address records to a DNS provider.
//
// ## Implementations
//
// - Cloudflare: `fleetsync-dns-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use fleetsync_core::traits::{DnsApplier, DnsRecords};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let applier = /* DnsApplier implementation */;
//
//     let mut changes = DnsRecords::new();
//     changes
//         .entry("api.internal.example.com".to_string())
//         .or_default()
//         .insert("10.0.0.5".to_string());
//
//     applier.apply_changes(&changes, 60).await?;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// DNS name to address set
///
/// Address sets are ordered and de-duplicated, so two sets holding the
/// same addresses compare equal regardless of discovery order.
pub type DnsRecords = BTreeMap<String, BTreeSet<String>>;

/// Trait for DNS applier implementations
///
/// # Contract
///
/// - Every name in `changes` ends up with an A-record set holding exactly
///   the given addresses (upsert). Names not in `changes` are untouched.
/// - The batch succeeds or fails as a unit from the caller's point of view.
/// - No retry logic: return the error, the reconciler retries next tick.
/// - Decide nothing about *whether* a change is needed; the diff engine
///   only calls with a non-empty delta.
#[async_trait]
pub trait DnsApplier: Send + Sync {
    /// Upsert a batch of address records
    ///
    /// # Parameters
    ///
    /// - `changes`: Names to (re)write and their full address sets
    /// - `ttl_secs`: Time-to-live applied to every record in the batch
    async fn apply_changes(&self, changes: &DnsRecords, ttl_secs: u32) -> Result<(), crate::Error>;

    /// Get the applier name (for logging/debugging)
    ///
    /// # Returns
    ///
    /// A static string identifying the provider (e.g., "cloudflare")
    fn applier_name(&self) -> &'static str;
}
