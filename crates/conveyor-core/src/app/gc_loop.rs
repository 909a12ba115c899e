//! GcLoop - periodic sweep of expired results and idempotency claims.
//!
//! Stores only drop an expired entry when someone reads it. Records nobody
//! polls again (scheduled fires, fire-and-forget tasks) would otherwise stay
//! in memory for the life of the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::ports::{ClaimStore, ResultStore};

pub struct GcLoop {
    results: Arc<dyn ResultStore>,
    claims: Arc<dyn ClaimStore>,
}

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Swept {
    pub results: usize,
    pub claims: usize,
}

impl GcLoop {
    pub fn new(results: Arc<dyn ResultStore>, claims: Arc<dyn ClaimStore>) -> Self {
        Self { results, claims }
    }

    /// Purge both stores once. A failing store is logged and skipped.
    pub async fn sweep(&self) -> Swept {
        let mut swept = Swept::default();
        match self.results.purge_expired().await {
            Ok(n) => swept.results = n,
            Err(err) => warn!(error = %err, "result sweep failed"),
        }
        match self.claims.purge_expired().await {
            Ok(n) => swept.claims = n,
            Err(err) => warn!(error = %err, "claim sweep failed"),
        }
        swept
    }

    pub async fn run(self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(every_secs = every.as_secs(), "gc loop started");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can have expired yet.
        ticker.tick().await;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let swept = self.sweep().await;
                    if swept != Swept::default() {
                        debug!(
                            results = swept.results,
                            claims = swept.claims,
                            "expired entries purged"
                        );
                    }
                }
            }
        }
        info!("gc loop stopped");
    }

    pub fn spawn(self, every: Duration) -> GcHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(every, shutdown_rx));
        GcHandle { shutdown_tx, join }
    }
}

pub struct GcHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl GcHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}
