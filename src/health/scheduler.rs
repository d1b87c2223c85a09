//! Periodic health checking.
//!
//! # Responsibilities
//! - Run one sweep per interval on the balancer
//! - Stop ticking once shutdown is signalled

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::load_balancer::Balancer;

/// Drives `Balancer::run_health_check` on a fixed interval.
pub struct HealthCheckScheduler {
    balancer: Arc<dyn Balancer>,
    interval: Duration,
}

impl HealthCheckScheduler {
    pub fn new(balancer: Arc<dyn Balancer>) -> Self {
        let interval = Duration::from_secs(balancer.health_check_interval_secs().max(1));
        Self { balancer, interval }
    }

    /// Spawn the scheduler loop onto the runtime.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Tick until shutdown. The first sweep runs immediately.
    ///
    /// Shutdown is only observed between sweeps, so a sweep in progress
    /// always completes.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            strategy = %self.balancer.strategy(),
            "Health check scheduler starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Health check scheduler received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    self.balancer.run_health_check().await;
                }
            }
        }
    }
}
