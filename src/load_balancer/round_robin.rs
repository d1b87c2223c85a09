//! Round-robin load balancing strategy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::health::prober::{probe_all, Prober, TcpProber};
use crate::load_balancer::{
    cursor::Cursor, parse_instances, Balancer, BalancerError, Instance, InstanceStatus, Strategy,
};
use crate::observability::metrics;

/// Round-robin selector.
/// Every draw advances the shared cursor; dead instances are skipped by
/// drawing again, at most once per instance.
#[derive(Debug)]
pub struct RoundRobin {
    instances: Vec<Instance>,
    cursor: Cursor,
    health_check_interval_secs: u64,
    prober: Arc<dyn Prober>,
    /// Serializes sweeps.
    sweep: Mutex<()>,
}

impl RoundRobin {
    /// Create a balancer that probes instances over TCP.
    pub fn new<S: AsRef<str>>(
        addresses: &[S],
        health_check_interval_secs: u64,
    ) -> Result<Self, BalancerError> {
        Self::with_prober(addresses, health_check_interval_secs, Arc::new(TcpProber::default()))
    }

    pub fn with_prober<S: AsRef<str>>(
        addresses: &[S],
        health_check_interval_secs: u64,
        prober: Arc<dyn Prober>,
    ) -> Result<Self, BalancerError> {
        Ok(Self {
            instances: parse_instances(addresses)?,
            cursor: Cursor::default(),
            health_check_interval_secs,
            prober,
            sweep: Mutex::new(()),
        })
    }
}

#[async_trait]
impl Balancer for RoundRobin {
    fn select_instance(&self) -> Result<usize, BalancerError> {
        let len = self.instances.len();
        if len == 0 {
            return Err(BalancerError::NoAliveInstance { attempts: 0 });
        }

        for _ in 0..len {
            let index = self.cursor.advance() as usize % len;
            if self.instances[index].is_alive() {
                return Ok(index);
            }
        }
        Err(BalancerError::NoAliveInstance { attempts: len })
    }

    fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Kept for the admin view only; round robin ignores latency.
    fn record_latency(&self, index: usize, elapsed: Duration) {
        if let Some(instance) = self.instances.get(index) {
            instance.record_latency(elapsed);
        }
    }

    async fn run_health_check(&self) {
        let _sweep = self.sweep.lock().await;

        let aliveness = probe_all(self.prober.as_ref(), &self.instances).await;
        for (instance, alive) in self.instances.iter().zip(&aliveness) {
            instance.set_alive(*alive);
            metrics::record_instance_health(instance.authority(), *alive);
        }

        tracing::info!(aliveness = ?aliveness, "Health check complete");
    }

    fn health_check_interval_secs(&self) -> u64 {
        self.health_check_interval_secs
    }

    fn strategy(&self) -> Strategy {
        Strategy::RoundRobin
    }

    fn snapshot(&self) -> Vec<InstanceStatus> {
        self.instances
            .iter()
            .map(|i| InstanceStatus {
                address: i.url().to_string(),
                alive: i.is_alive(),
                latency_ns: i.latency_estimate(),
                weight: None,
            })
            .collect()
    }
}
