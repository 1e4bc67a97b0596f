// # Cloudflare DNS Applier
//
// This crate pushes fleetsync DNS change sets to Cloudflare.
//
// ## Behavior
//
// - One call to `apply_changes` is one atomic batch request
// - Every record is an A record with the TTL the engine passes in
// - Within a name, records already pointing at a desired address are kept;
//   the rest are deleted and the missing addresses are created
// - Zone is given either as a zone id or as a zone name; a name is looked
//   up once and the id is cached for the applier's lifetime
// - No retry or backoff here: failures go back to the reconciler, which
//   retries the whole change set on its next tick
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Construction fails fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=A`
// - Batch DNS Records: POST `/zones/:zone_id/dns_records/batch`

use async_trait::async_trait;
use fleetsync_core::traits::{DnsApplier, DnsRecords};
use fleetsync_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Record type managed by this applier
const RECORD_TYPE_A: &str = "A";

/// An existing A record as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExistingRecord {
    pub id: String,
    pub content: String,
}

/// Body of a batch request
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRequest {
    pub deletes: Vec<BatchDelete>,
    pub posts: Vec<BatchPost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchDelete {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchPost {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    pub ttl: u32,
}

impl BatchRequest {
    /// Add the operations that bring `name` from `existing` to `desired`
    pub fn plan_name(
        &mut self,
        name: &str,
        existing: &[ExistingRecord],
        desired: &BTreeSet<String>,
        ttl_secs: u32,
    ) {
        let mut kept = BTreeSet::new();

        for record in existing {
            // Duplicates of a kept address are deleted too
            if desired.contains(&record.content) && kept.insert(record.content.as_str()) {
                continue;
            }
            self.deletes.push(BatchDelete {
                id: record.id.clone(),
            });
        }

        for address in desired {
            if !kept.contains(address.as_str()) {
                self.posts.push(BatchPost {
                    record_type: RECORD_TYPE_A.to_string(),
                    name: name.to_string(),
                    content: address.clone(),
                    ttl: ttl_secs,
                });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.posts.is_empty()
    }
}

/// Whether a configured zone is a zone id rather than a zone name
///
/// Zone names always contain a dot; Cloudflare zone ids never do.
pub fn is_zone_id(zone: &str) -> bool {
    !zone.contains('.')
}

/// Cloudflare DNS applier
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the applier will:
/// - Perform all GET requests (zone lookup, record lookup)
/// - Log the intended batch payload
/// - **NOT** actually modify DNS records
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct CloudflareApplier {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone id, or zone name to resolve
    zone: String,

    /// Zone id once resolved
    zone_id: OnceCell<String>,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip the batch POST
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareApplier")
            .field("api_token", &"<REDACTED>")
            .field("zone", &self.zone)
            .field("zone_id", &self.zone_id.get())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareApplier {
    /// Create a new Cloudflare applier
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone`: Zone id, or zone name (a name is resolved on first apply)
    /// - `dry_run`: If true, perform GET requests but skip the batch POST
    pub fn new(api_token: impl Into<String>, zone: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let zone = zone.into();
        if zone.trim().is_empty() {
            return Err(Error::config("Cloudflare zone cannot be empty"));
        }

        // Build HTTP client with timeout
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone,
            zone_id: OnceCell::new(),
            client,
            dry_run,
        })
    }

    /// Create a new Cloudflare applier (production/live mode)
    pub fn new_live(api_token: impl Into<String>, zone: impl Into<String>) -> Result<Self> {
        Self::new(api_token, zone, false)
    }

    /// Create a new Cloudflare applier (dry-run mode)
    ///
    /// Lookups still hit the API; the batch is only logged.
    pub fn new_dry_run(api_token: impl Into<String>, zone: impl Into<String>) -> Result<Self> {
        Self::new(api_token, zone, true)
    }

    /// Whether this applier only logs its batches
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Resolve the configured zone to a zone id, caching the result
    ///
    /// A failed lookup is not cached; the next apply tries again.
    async fn resolve_zone_id(&self) -> Result<String> {
        self.zone_id
            .get_or_try_init(|| self.lookup_zone_id())
            .await
            .cloned()
    }

    /// Look the configured zone up by name
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn lookup_zone_id(&self) -> Result<String> {
        if is_zone_id(&self.zone) {
            tracing::debug!("Using configured zone ID");
            return Ok(self.zone.clone());
        }

        let zone_name = self.zone.trim_end_matches('.');
        tracing::debug!("Looking up zone ID for zone: {}", zone_name);

        let url = format!("{}/zones", CLOUDFLARE_API_BASE);
        let json = self
            .get_json(&url, &[("name", zone_name)], "Zone lookup")
            .await?;

        let zones = json["result"].as_array().ok_or_else(|| {
            Error::provider("cloudflare", "Invalid response format: result is not an array")
        })?;

        match zones.as_slice() {
            [] => Err(Error::provider(
                "cloudflare",
                format!("Zone not found: {}", zone_name),
            )),
            [zone] => {
                let zone_id = zone["id"].as_str().ok_or_else(|| {
                    Error::provider("cloudflare", "Invalid response format: zone.id is not a string")
                })?;
                tracing::debug!("Found zone ID: {}", zone_id);
                Ok(zone_id.to_string())
            }
            _ => Err(Error::provider(
                "cloudflare",
                format!("Found multiple zones for name {}", zone_name),
            )),
        }
    }

    /// List the A records currently published for `name`
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=foo.example.com&type=A
    /// Authorization: Bearer <token>
    /// ```
    async fn list_records(&self, zone_id: &str, name: &str) -> Result<Vec<ExistingRecord>> {
        let url = format!("{}/zones/{}/dns_records", CLOUDFLARE_API_BASE, zone_id);
        let json = self
            .get_json(&url, &[("name", name), ("type", RECORD_TYPE_A)], "Record lookup")
            .await?;

        let result = json.get("result").cloned().unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| {
            Error::provider(
                "cloudflare",
                format!("Invalid response format for records of {}: {}", name, e),
            )
        })
    }

    /// Send one batch request
    async fn post_batch(&self, zone_id: &str, batch: &BatchRequest) -> Result<()> {
        let url = format!("{}/zones/{}/dns_records/batch", CLOUDFLARE_API_BASE, zone_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(batch)
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))?;

        let json = Self::read_response(response, "Batch update").await?;

        if json["success"].as_bool() == Some(false) {
            return Err(Error::provider(
                "cloudflare",
                format!("Batch update rejected: {}", json["errors"]),
            ));
        }

        Ok(())
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)], context: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e)))?;

        Self::read_response(response, context).await
    }

    /// Map a non-success status to an error, otherwise parse the body
    async fn read_response(response: reqwest::Response, context: &str) -> Result<Value> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), context, &error_text));
        }

        response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("Failed to parse response: {}", e))
        })
    }
}

/// Map an HTTP error status to an applier error
fn status_error(status: u16, context: &str, body: &str) -> Error {
    let message = match status {
        401 | 403 => format!(
            "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
            status
        ),
        404 => format!("{} failed: not found. Status: {}", context, status),
        409 => format!(
            "Conflict: Records are being updated by another process. Status: {}",
            status
        ),
        429 => format!("Rate limit exceeded. Please retry later. Status: {}", status),
        500..=599 => format!("Cloudflare server error (transient): {} - {}", status, body),
        _ => format!("{} failed: {} - {}", context, status, body),
    };

    Error::provider("cloudflare", message)
}

#[async_trait]
impl DnsApplier for CloudflareApplier {
    /// Apply a change set as one atomic batch
    ///
    /// # API Calls
    ///
    /// ```http
    /// # Per changed name
    /// GET /zones/:zone_id/dns_records?name=foo.example.com&type=A
    ///
    /// # Once (skipped in dry-run mode)
    /// POST /zones/:zone_id/dns_records/batch
    /// {
    ///   "deletes": [{ "id": "..." }],
    ///   "posts": [{ "type": "A", "name": "foo.example.com", "content": "10.0.0.5", "ttl": 60 }]
    /// }
    /// ```
    async fn apply_changes(&self, changes: &DnsRecords, ttl_secs: u32) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        tracing::info!(
            "Applying Cloudflare DNS changes for {} name(s) [mode: {}]",
            changes.len(),
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let zone_id = self.resolve_zone_id().await?;

        let mut batch = BatchRequest::default();
        for (name, addresses) in changes {
            let existing = self.list_records(&zone_id, name).await?;
            tracing::debug!(
                "{}: {} existing record(s), {} desired address(es)",
                name,
                existing.len(),
                addresses.len()
            );
            batch.plan_name(name, &existing, addresses, ttl_secs);
        }

        if batch.is_empty() {
            tracing::info!("Cloudflare records already match, nothing to send");
            return Ok(());
        }

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send batch to zone {}: {}",
                zone_id,
                serde_json::to_string(&batch)?
            );
            return Ok(());
        }

        self.post_batch(&zone_id, &batch).await?;

        tracing::info!(
            "Cloudflare batch applied: {} deleted, {} created",
            batch.deletes.len(),
            batch.posts.len()
        );
        Ok(())
    }

    fn applier_name(&self) -> &'static str {
        "cloudflare"
    }
}
