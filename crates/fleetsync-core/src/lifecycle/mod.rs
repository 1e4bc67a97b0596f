//! Lifecycle controller
//!
//! Drives a [`Reconciler`] on a fixed period and guarantees that shutdown
//! happens exactly once, whoever asks for it (a signal handler, a control
//! endpoint, embedding code) and however many ask concurrently.
//!
//! ## States
//!
//! ```text
//! running ── first stop() ──► stopping (terminal)
//!                               │
//!                               └─ later stop() ──► Err(AlreadyStopping)
//! ```
//!
//! ## Cancellation
//!
//! Stopping is cooperative. An in-flight tick always runs to completion;
//! the stop only prevents the next tick and releases [`Controller::run`].

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info};

use crate::engine::{EngineEvent, Reconciler};
use crate::error::{Error, Result};

/// Periodic driver with exactly-once shutdown
///
/// Share it behind an `Arc` so stop requests can come from other tasks.
///
/// # Example
///
/// ```rust,no_run
/// use fleetsync_core::{Controller, ControllerConfig, Reconciler};
/// use fleetsync_core::inventory::MemoryInventory;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> fleetsync_core::Result<()> {
///     let config = ControllerConfig::new();
///     let period = config.sync_period();
///     let (reconciler, _events) =
///         Reconciler::new(Box::new(MemoryInventory::new()), None, config)?;
///
///     let controller = Arc::new(Controller::new(reconciler, period)?);
///
///     let stopper = Arc::clone(&controller);
///     tokio::spawn(async move {
///         let _ = tokio::signal::ctrl_c().await;
///         let _ = stopper.stop();
///     });
///
///     controller.run().await
/// }
/// ```
pub struct Controller {
    /// Reconciler waiting to be moved into the driver task
    reconciler: Mutex<Option<Reconciler>>,

    /// Tick period
    period: Duration,

    /// Shutdown flag; only one stop() may flip it
    stop_lock: Mutex<bool>,

    /// Shutdown signal, released once
    stop_tx: watch::Sender<bool>,
}

impl Controller {
    /// Create a controller for `reconciler` ticking every `period`
    pub fn new(reconciler: Reconciler, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::config("Controller period must be > 0"));
        }

        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            reconciler: Mutex::new(Some(reconciler)),
            period,
            stop_lock: Mutex::new(false),
            stop_tx,
        })
    }

    /// Spawn the periodic driver and return immediately
    ///
    /// The first tick fires right away. If a tick overruns the period the
    /// next one is delayed rather than bunched, so ticks never overlap.
    ///
    /// # Returns
    ///
    /// - `Ok(JoinHandle)`: Completes once the driver has stopped
    /// - `Err(Error::AlreadyStarted)`: The driver was already spawned
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let reconciler = self
            .reconciler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::AlreadyStarted)?;

        info!("Starting fleetsync controller (sync period {:?})", self.period);

        Ok(tokio::spawn(drive(
            reconciler,
            self.period,
            self.stop_tx.subscribe(),
        )))
    }

    /// Wait until shutdown has been requested
    pub async fn stopped(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        // The sender lives as long as `self`, so this only returns on stop
        let _ = stop_rx.wait_for(|stopping| *stopping).await;
    }

    /// Start the driver and block until shutdown completes
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown, the last tick has finished
    /// - `Err(Error)`: Already started, or the driver task panicked
    pub async fn run(&self) -> Result<()> {
        let driver = self.start()?;

        self.stopped().await;
        info!("Shutting down controller");

        driver
            .await
            .map_err(|e| Error::Other(format!("Reconciliation driver failed: {}", e)))?;

        info!("Controller stopped");
        Ok(())
    }

    /// Request shutdown
    ///
    /// Safe to call from any task, any number of times.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: This call initiated shutdown
    /// - `Err(Error::AlreadyStopping)`: Shutdown was already underway
    pub fn stop(&self) -> Result<()> {
        let mut shutdown = self.stop_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if *shutdown {
            return Err(Error::AlreadyStopping);
        }

        *shutdown = true;
        self.stop_tx.send_replace(true);
        info!("Shutdown requested");

        Ok(())
    }

    /// Whether shutdown has been requested
    pub fn is_stopping(&self) -> bool {
        *self.stop_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receiver observing the shutdown signal
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}

/// Tick `reconciler` every `period` until the stop signal fires
async fn drive(mut reconciler: Reconciler, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = IntervalStream::new(interval);

    loop {
        tokio::select! {
            biased;

            // The watch::Ref must not outlive this arm, or the driver is not Send
            _ = async { let _ = stop_rx.wait_for(|stopping| *stopping).await; } => break,

            Some(_) = ticks.next() => {
                match reconciler.tick().await {
                    Ok(report) => debug!(
                        "Tick {} done: {} instance(s), {} issue(s)",
                        report.tick,
                        report.instances,
                        report.issues.len()
                    ),
                    Err(e) => reconciler.report_failure(&e),
                }
            }
        }
    }

    reconciler.emit_event(EngineEvent::Stopped {
        reason: "Shutdown requested".to_string(),
    });
    info!(
        "Reconciliation loop stopped after {} tick(s)",
        reconciler.tick_count()
    );
}
