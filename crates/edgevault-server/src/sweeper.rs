//! Background expiry sweep.
//!
//! Lazy expiry only removes records somebody reads. The sweeper periodically
//! evicts the rest through [`SessionGateway::sweep_expired`] and releases idle
//! actors, so neither storage nor the routing table grows with abandoned
//! sessions.

use std::time::Duration;

use edgevault_core::Environment;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    gateway::{SessionGateway, SweepReport},
    storage::Storage,
};

/// Periodic driver for [`SessionGateway::sweep_expired`].
pub struct ExpirySweeper<E: Environment, S: Storage> {
    gateway: SessionGateway<E, S>,
    env: E,
    interval: Duration,
}

/// Handle to a running sweeper.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the current pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "expiry sweeper task ended abnormally");
        }
    }
}

impl<E: Environment, S: Storage> ExpirySweeper<E, S> {
    /// Sweeper over `gateway`, using the gateway's `sweepIntervalMs`.
    pub fn new(gateway: SessionGateway<E, S>, env: E) -> Self {
        let interval = gateway.config().sweep_interval();
        Self { gateway, env, interval }
    }

    /// Override the sweep period.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one pass now.
    ///
    /// A listing failure is logged and reported as an empty pass; the next
    /// pass tries again.
    pub async fn run_once(&self) -> SweepReport {
        let started = self.env.now();

        let report = match self.gateway.sweep_expired().await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "expiry sweep skipped");
                SweepReport::default()
            },
        };

        tracing::debug!(
            scanned = report.scanned,
            expired = report.expired,
            failed = report.failed,
            released = report.released,
            elapsed_ms = (self.env.now() - started).as_millis() as u64,
            "expiry sweep finished"
        );
        report
    }

    /// Spawn the periodic loop on the current tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            let interval_ms = self.interval.as_millis() as u64;
            tracing::debug!(interval_ms, "expiry sweeper started");
            loop {
                tokio::select! {
                    () = self.env.sleep(self.interval) => {
                        self.run_once().await;
                    },
                    _ = stopped.changed() => break,
                }
            }
            tracing::debug!("expiry sweeper stopped");
        });

        SweeperHandle { shutdown, task }
    }
}
