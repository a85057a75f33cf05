//! Rotation scheduling.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::RotationConfig;
use crate::rotation::RotationCoordinator;

/// Drives the coordinator on a fixed interval.
pub struct RotationScheduler {
    coordinator: Arc<RotationCoordinator>,
    interval: Duration,
    rotate_on_start: bool,
}

impl RotationScheduler {
    pub fn new(coordinator: Arc<RotationCoordinator>, config: &RotationConfig) -> Self {
        Self {
            coordinator,
            interval: config.interval(),
            rotate_on_start: config.rotate_on_start,
        }
    }

    /// Run until shutdown. Failed rotations are logged and retried on the
    /// next tick; the store keeps its last-known-good state meanwhile.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            rotate_on_start = self.rotate_on_start,
            "Rotation scheduler starting"
        );

        let first = if self.rotate_on_start {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + self.interval
        };
        let mut ticker = tokio::time::interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => {
                    tracing::info!("Rotation scheduler received shutdown signal, exiting");
                    break;
                }
            }

            tokio::select! {
                result = self.coordinator.rotate() => match result {
                    Ok(report) => tracing::info!(
                        bootstrap = report.bootstrap,
                        started_at = report.window.started_at,
                        "Scheduled rotation finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "Scheduled rotation failed"),
                },
                _ = shutdown.recv() => {
                    tracing::warn!("Shutdown during rotation, any staged secret stays accepted until the next run");
                    break;
                }
            }
        }
    }
}
