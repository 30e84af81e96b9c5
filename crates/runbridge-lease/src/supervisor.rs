//! Reconciliation supervisor.
//!
//! A background task that periodically sweeps every session through the
//! timeout guards in [`crate::machine`]. Detection latency is bounded by the
//! sweep interval; the pass itself is idempotent, so overlapping or repeated
//! runs are harmless.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::service::LeaseControl;

/// Spawn the supervisor loop.
///
/// The task runs until aborted; drop the handle or call `abort()` on
/// shutdown. Sweep failures are logged and the loop keeps going — a broken
/// pass must not stop timeout detection for good.
pub fn spawn<L>(service: Arc<L>, interval: std::time::Duration) -> JoinHandle<()>
where
    L: LeaseControl + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a freshly started
        // relay doesn't sweep before handlers are serving.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match service.sweep(Utc::now()).await {
                Ok(report) => {
                    if report.transitions > 0 || report.skipped > 0 {
                        tracing::info!(
                            examined = report.examined,
                            transitions = report.transitions,
                            skipped = report.skipped,
                            "reconciliation sweep finished"
                        );
                    } else {
                        tracing::debug!(examined = report.examined, "reconciliation sweep idle");
                    }
                }
                Err(error) => {
                    tracing::error!(error = %error, "reconciliation sweep failed");
                }
            }
        }
    })
}
