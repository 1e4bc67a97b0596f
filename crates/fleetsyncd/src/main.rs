// # fleetsyncd - Fleetsync Daemon
//
// The fleetsyncd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the inventory source and DNS applier
// 4. Running the controller until SIGTERM/SIGINT
//
// All reconciliation logic lives in fleetsync-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Controller
// - `FLEETSYNC_CLUSTER_ID`: Cluster identity (required)
// - `FLEETSYNC_SYNC_PERIOD_SECS`: Reconcile period in seconds (default 30)
// - `FLEETSYNC_SOURCE_DEST_CHECK`: true, false or unmanaged (default false)
//
// ### Inventory
// - `FLEETSYNC_INVENTORY_PATH`: Path to the JSON inventory document (required)
//
// ### DNS
// - `FLEETSYNC_DNS_PROVIDER`: cloudflare, or unset to disable DNS
// - `FLEETSYNC_DNS_ZONE`: Zone id or zone name
// - `FLEETSYNC_CLOUDFLARE_API_TOKEN`: API token
// - `FLEETSYNC_DNS_DRY_RUN`: Log DNS batches instead of sending them
//
// ### Logging
// - `FLEETSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export FLEETSYNC_CLUSTER_ID=prod
// export FLEETSYNC_INVENTORY_PATH=/var/lib/fleetsync/inventory.json
// export FLEETSYNC_DNS_PROVIDER=cloudflare
// export FLEETSYNC_DNS_ZONE=example.com
// export FLEETSYNC_CLOUDFLARE_API_TOKEN=your_token
//
// fleetsyncd
// ```

use anyhow::{Result, anyhow};
use fleetsync_core::traits::DnsApplier;
use fleetsync_core::{Controller, ControllerConfig, FileInventory, Reconciler};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum FleetsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (including a failed stop)
    RuntimeError = 2,
}

impl From<FleetsyncExitCode> for ExitCode {
    fn from(code: FleetsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    cluster_id: String,
    sync_period_secs: u64,
    source_dest_check: Option<bool>,
    inventory_path: String,
    dns_provider: Option<String>,
    dns_zone: Option<String>,
    cloudflare_api_token: Option<String>,
    dns_dry_run: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let sync_period_secs: u64 = match non_empty("FLEETSYNC_SYNC_PERIOD_SECS") {
            Some(value) => value.trim().parse().map_err(|e| {
                anyhow!("FLEETSYNC_SYNC_PERIOD_SECS must be a number of seconds. Got: {} ({})", value, e)
            })?,
            None => 30,
        };

        let source_dest_check = match non_empty("FLEETSYNC_SOURCE_DEST_CHECK")
            .map(|value| value.trim().to_lowercase())
            .as_deref()
        {
            None | Some("false") => Some(false),
            Some("true") => Some(true),
            Some("unmanaged") => None,
            Some(other) => anyhow::bail!(
                "FLEETSYNC_SOURCE_DEST_CHECK '{}' is not valid. \
                Valid values: true, false, unmanaged",
                other
            ),
        };

        let dns_dry_run = match non_empty("FLEETSYNC_DNS_DRY_RUN")
            .map(|value| value.trim().to_lowercase())
            .as_deref()
        {
            None | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => anyhow::bail!(
                "FLEETSYNC_DNS_DRY_RUN '{}' is not valid. Valid values: true, false",
                other
            ),
        };

        Ok(Self {
            cluster_id: non_empty("FLEETSYNC_CLUSTER_ID").ok_or_else(|| {
                anyhow!(
                    "FLEETSYNC_CLUSTER_ID is required. \
                    Set it via: export FLEETSYNC_CLUSTER_ID=your_cluster"
                )
            })?,
            sync_period_secs,
            source_dest_check,
            inventory_path: non_empty("FLEETSYNC_INVENTORY_PATH").ok_or_else(|| {
                anyhow!(
                    "FLEETSYNC_INVENTORY_PATH is required. \
                    Set it via: export FLEETSYNC_INVENTORY_PATH=/var/lib/fleetsync/inventory.json"
                )
            })?,
            dns_provider: non_empty("FLEETSYNC_DNS_PROVIDER").map(|p| p.trim().to_lowercase()),
            dns_zone: non_empty("FLEETSYNC_DNS_ZONE"),
            cloudflare_api_token: non_empty("FLEETSYNC_CLOUDFLARE_API_TOKEN"),
            dns_dry_run,
            log_level: non_empty("FLEETSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if !(1..=86400).contains(&self.sync_period_secs) {
            anyhow::bail!(
                "FLEETSYNC_SYNC_PERIOD_SECS must be between 1 and 86400 seconds. Got: {}",
                self.sync_period_secs
            );
        }

        match self.dns_provider.as_deref() {
            None => {}
            Some("cloudflare") => {
                if self.dns_zone.is_none() {
                    anyhow::bail!(
                        "FLEETSYNC_DNS_ZONE is required when FLEETSYNC_DNS_PROVIDER=cloudflare"
                    );
                }
                if self.cloudflare_api_token.is_none() {
                    anyhow::bail!(
                        "FLEETSYNC_CLOUDFLARE_API_TOKEN is required when FLEETSYNC_DNS_PROVIDER=cloudflare"
                    );
                }
            }
            Some(other) => anyhow::bail!(
                "FLEETSYNC_DNS_PROVIDER '{}' is not supported. \
                Supported providers: cloudflare",
                other
            ),
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "FLEETSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Controller configuration derived from the environment
    fn controller_config(&self) -> ControllerConfig {
        let mut config = ControllerConfig::new()
            .with_cluster_id(self.cluster_id.clone())
            .with_sync_period_secs(self.sync_period_secs);
        config.source_dest_check = self.source_dest_check;
        config
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return FleetsyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return FleetsyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FleetsyncExitCode::ConfigError.into();
    }

    info!("fleetsyncd version {}", env!("CARGO_PKG_VERSION"));
    info!("Cluster: {}", config.cluster_id);

    // Build components before entering the runtime loop
    let controller = match build_controller(&config) {
        Ok(controller) => Arc::new(controller),
        Err(e) => {
            error!("Startup error: {}", e);
            return FleetsyncExitCode::ConfigError.into();
        }
    };

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FleetsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(controller).await {
            error!("Daemon error: {}", e);
            FleetsyncExitCode::RuntimeError
        } else {
            FleetsyncExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Wire the inventory source, DNS applier and reconciler together
fn build_controller(config: &Config) -> Result<Controller> {
    let controller_config = config.controller_config();
    let period = controller_config.sync_period();

    match controller_config.source_dest_check {
        Some(enabled) => info!("Managing SourceDestCheck: desired value {}", enabled),
        None => info!("SourceDestCheck unmanaged"),
    }

    info!("Inventory file: {}", config.inventory_path);
    let inventory = Box::new(FileInventory::new(&config.inventory_path));

    let dns_applier = build_dns_applier(config)?;

    let (reconciler, _events) = Reconciler::new(inventory, dns_applier, controller_config)?;

    Ok(Controller::new(reconciler, period)?)
}

/// Create the configured DNS applier, if any
fn build_dns_applier(config: &Config) -> Result<Option<Box<dyn DnsApplier>>> {
    let Some(provider) = config.dns_provider.as_deref() else {
        info!("No DNS provider configured, DNS management disabled");
        return Ok(None);
    };

    match provider {
        #[cfg(feature = "cloudflare")]
        "cloudflare" => {
            let zone = config.dns_zone.clone().unwrap_or_default();
            let token = config.cloudflare_api_token.clone().unwrap_or_default();

            if config.dns_dry_run {
                warn!("Cloudflare applier running in DRY-RUN mode - no changes will be made");
            }

            info!("DNS provider: cloudflare (zone {})", zone);
            let applier =
                fleetsync_dns_cloudflare::CloudflareApplier::new(token, zone, config.dns_dry_run)?;
            Ok(Some(Box::new(applier)))
        }
        other => Err(anyhow!(
            "DNS provider '{}' is not available in this build",
            other
        )),
    }
}

/// Run the controller until a shutdown signal stops it
async fn run_daemon(controller: Arc<Controller>) -> Result<()> {
    let stopper = tokio::spawn(stop_on_signal(Arc::clone(&controller)));

    controller.run().await?;

    let signal_name = stopper
        .await
        .map_err(|e| anyhow!("Signal handler task failed: {}", e))??;

    info!("Stopped after {}", signal_name);
    Ok(())
}

/// Wait for SIGTERM or SIGINT, then stop the controller
///
/// A failed stop is reported and turned into an error so the daemon exits
/// non-zero.
#[cfg(unix)]
async fn stop_on_signal(controller: Arc<Controller>) -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal_name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    info!("Received shutdown signal: {}", signal_name);

    controller.stop().map_err(|e| {
        error!("Error stopping controller: {}", e);
        anyhow!("Failed to stop controller: {}", e)
    })?;

    Ok(signal_name)
}

/// Wait for CTRL-C, then stop the controller
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn stop_on_signal(controller: Arc<Controller>) -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to wait for CTRL-C: {}", e))?;

    info!("Received shutdown signal: SIGINT");

    controller.stop().map_err(|e| {
        error!("Error stopping controller: {}", e);
        anyhow!("Failed to stop controller: {}", e)
    })?;

    Ok("SIGINT")
}
