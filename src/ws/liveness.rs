//! Mark-then-probe liveness monitor.
//!
//! Every period, each connection that did not answer the previous probe
//! is terminated and unregistered; every other connection has its liveness
//! flag cleared and receives a transport ping. A pong sets the flag again,
//! so an unresponsive peer disappears within at most two periods.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::connection::Frame;
use super::registry::ConnectionRegistry;

/// Counts from one monitor tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections that were sent a ping.
    pub probed: usize,
    /// Connections removed for missing the previous probe, or whose ping
    /// could not be queued.
    pub pruned: usize,
}

/// Runs one monitor tick over `registry`.
pub fn sweep(registry: &ConnectionRegistry) -> SweepReport {
    let mut report = SweepReport::default();
    registry.for_each(|conn| {
        if !conn.take_alive() {
            tracing::info!(connection_id = %conn.id(), "terminating inactive client");
            conn.terminate();
            registry.unregister(conn.id());
            report.pruned += 1;
            return;
        }
        if conn.try_send(Frame::Ping).is_err() {
            tracing::info!(connection_id = %conn.id(), "ping could not be queued, dropping client");
            conn.terminate();
            registry.unregister(conn.id());
            report.pruned += 1;
            return;
        }
        report.probed += 1;
    });
    report
}

/// Background task running [`sweep`] on a fixed period.
///
/// The task is aborted when the monitor is dropped, so it cannot outlive
/// its owner on any exit path.
#[derive(Debug)]
pub struct LivenessMonitor {
    handle: JoinHandle<()>,
}

impl LivenessMonitor {
    /// Spawns the monitor. The first tick fires one `period` from now.
    #[must_use]
    pub fn spawn(registry: Arc<ConnectionRegistry>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = sweep(&registry);
                if report.pruned > 0 {
                    tracing::info!(
                        probed = report.probed,
                        pruned = report.pruned,
                        "liveness sweep"
                    );
                }
            }
        });
        Self { handle }
    }

    /// Stops the monitor.
    pub fn stop(self) {
        drop(self);
    }

    /// Whether the background task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
