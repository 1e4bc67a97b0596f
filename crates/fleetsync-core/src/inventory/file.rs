// # File Inventory
//
// InventorySource backed by a JSON inventory document.
//
// ## Purpose
//
// Lets the controller run against an inventory exported by another tool
// (or written by hand) without any cloud credentials. The document is
// re-read on every poll, so external edits show up on the next tick.
//
// ## Attribute Mutation
//
// `set_source_dest_check` rewrites the instance's entry in the document:
// - Read-modify-write under a lock, so concurrent mutations never lose
//   each other's updates
// - Atomic writes: new content written to a temporary file, then renamed
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "instances": [
//     {
//       "id": "i-0123456789abcdef0",
//       "state": "running",
//       "source_dest_check": true,
//       "tags": { "KubernetesCluster": "prod", "k8s.io/dns/internal": "api.internal.example.com" },
//       "private_ip": "10.0.0.5",
//       "public_ip": "203.0.113.5"
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::model::Instance;
use crate::traits::inventory_source::{InstanceFilter, InventorySource};
use crate::Error;

/// Inventory file format version
const INVENTORY_FILE_VERSION: &str = "1.0";

/// Serializable inventory document
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct InventoryFileFormat {
    version: String,
    #[serde(default)]
    instances: Vec<Instance>,
}

/// File-based inventory source
///
/// # Example
///
/// ```rust,no_run
/// use fleetsync_core::inventory::FileInventory;
/// use fleetsync_core::traits::{InstanceFilter, InventorySource};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let inventory = FileInventory::new("/var/lib/fleetsync/inventory.json");
///
///     let instances = inventory.list_instances(&InstanceFilter::new()).await?;
///     println!("{} instances", instances.len());
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileInventory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileInventory {
    /// Create an inventory source reading from `path`
    ///
    /// The file is not touched until the first poll.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the inventory document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a full inventory document (creating parent directories)
    pub async fn write_instances(&self, instances: Vec<Instance>) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create inventory directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        self.write_document(&InventoryFileFormat {
            version: INVENTORY_FILE_VERSION.to_string(),
            instances,
        })
        .await
    }

    /// Load the inventory document
    async fn load_document(&self) -> Result<InventoryFileFormat, Error> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::inventory(format!(
                "Failed to read inventory file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let document: InventoryFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::inventory(format!(
                "Failed to parse inventory file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if document.version != INVENTORY_FILE_VERSION {
            tracing::warn!(
                "Inventory file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                INVENTORY_FILE_VERSION,
                document.version
            );
        }

        Ok(document)
    }

    /// Write the inventory document atomically
    async fn write_document(&self, document: &InventoryFileFormat) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(document)?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await?;

        tracing::trace!("Inventory written to file: {}", self.path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }
}

#[async_trait]
impl InventorySource for FileInventory {
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<Instance>, Error> {
        tracing::debug!("Reading inventory from {}", self.path.display());

        let document = self.load_document().await?;
        Ok(document
            .instances
            .into_iter()
            .filter(|instance| filter.matches(instance))
            .collect())
    }

    async fn set_source_dest_check(&self, instance_id: &str, enabled: bool) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.load_document().await?;
        let instance = document
            .instances
            .iter_mut()
            .find(|instance| instance.id == instance_id)
            .ok_or_else(|| {
                Error::provider("file", format!("instance {:?} not found", instance_id))
            })?;

        instance.source_dest_check = Some(enabled);

        self.write_document(&document).await
    }

    fn source_name(&self) -> &'static str {
        "file"
    }
}
