//! Latency-weighted round-robin load balancing strategy.
//!
//! # Selection
//! Draw `next` from the shared cursor. With `n` instances, the draw lands on
//! `index = next % n` in round `next / n`. The draw is accepted when
//! `(weight * round) % MAX_WEIGHT <= weight`. As `round` advances, the left
//! side sweeps `[0, MAX_WEIGHT)` roughly uniformly, so an instance is accepted
//! in about `weight / MAX_WEIGHT` of its rounds. A rejected draw moves on to a
//! fresh cursor value, never to a neighbouring instance.
//!
//! # Weights
//! Recomputed on every health check: `1 / latency` for alive instances, `0`
//! for dead ones, scaled so the fastest alive instance gets `MAX_WEIGHT`.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::health::prober::{probe_all, Prober, TcpProber};
use crate::load_balancer::{
    cursor::Cursor, parse_instances, Balancer, BalancerError, Instance, InstanceStatus, Strategy,
};
use crate::observability::metrics;

/// Largest weight an instance can hold.
pub const MAX_WEIGHT: u16 = u16::MAX;

/// Latency estimates below this (nanoseconds) are treated as this value.
const MIN_LATENCY_NANOS: f64 = 1.0;

/// Convert per-instance latency estimates into a weight table.
///
/// `None` marks a dead instance. Returns all zeros when nothing is alive.
pub fn compute_weights(latencies: &[Option<f64>]) -> Vec<u16> {
    let scores: Vec<f64> = latencies
        .iter()
        .map(|latency| match latency {
            Some(nanos) => 1.0 / nanos.max(MIN_LATENCY_NANOS),
            None => 0.0,
        })
        .collect();

    let max_score = scores.iter().copied().fold(0.0_f64, f64::max);
    if max_score <= 0.0 {
        return vec![0; scores.len()];
    }

    let max_weight = f64::from(MAX_WEIGHT);
    scores
        .iter()
        .map(|score| (score / max_score * max_weight).round().clamp(0.0, max_weight) as u16)
        .collect()
}

/// Whether a draw in `round` is accepted for an instance of `weight`.
fn accepts(weight: u16, round: u64) -> bool {
    if weight == 0 {
        return false;
    }
    let weight = u64::from(weight);
    (weight * round) % u64::from(MAX_WEIGHT) <= weight
}

/// Weighted round-robin selector.
#[derive(Debug)]
pub struct WeightedRoundRobin {
    instances: Vec<Instance>,
    cursor: Cursor,
    health_check_interval_secs: u64,
    prober: Arc<dyn Prober>,
    /// Index-aligned with `instances`. Replaced whole on every sweep; alive
    /// flags are only written while this lock is held exclusively.
    weights: RwLock<Vec<u16>>,
    /// Serializes sweeps.
    sweep: Mutex<()>,
}

impl WeightedRoundRobin {
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
        let instances = parse_instances(addresses)?;
        // Everything starts alive with the same seeded estimate.
        let weights = vec![MAX_WEIGHT; instances.len()];

        Ok(Self {
            instances,
            cursor: Cursor::default(),
            health_check_interval_secs,
            prober,
            weights: RwLock::new(weights),
            sweep: Mutex::new(()),
        })
    }

    /// Copy of the current weight table.
    pub fn weights(&self) -> Vec<u16> {
        self.weights.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Balancer for WeightedRoundRobin {
    fn select_instance(&self) -> Result<usize, BalancerError> {
        let weights = self.weights.read().unwrap_or_else(PoisonError::into_inner);

        let len = weights.len() as u64;
        if len == 0 {
            return Err(BalancerError::NoAliveInstance { attempts: 0 });
        }

        for _ in 0..len {
            let next = u64::from(self.cursor.advance());
            let index = (next % len) as usize;
            let round = next / len;

            if !accepts(weights[index], round) {
                continue;
            }
            if !self.instances[index].is_alive() {
                continue;
            }
            return Ok(index);
        }
        Err(BalancerError::NoAliveInstance { attempts: len as usize })
    }

    fn instances(&self) -> &[Instance] {
        &self.instances
    }

    fn record_latency(&self, index: usize, elapsed: Duration) {
        if let Some(instance) = self.instances.get(index) {
            instance.record_latency(elapsed);
        }
    }

    async fn run_health_check(&self) {
        let _sweep = self.sweep.lock().await;

        // Probes run without holding the table lock.
        let aliveness = probe_all(self.prober.as_ref(), &self.instances).await;

        let latencies: Vec<Option<f64>> = self
            .instances
            .iter()
            .zip(&aliveness)
            .map(|(instance, alive)| alive.then(|| instance.latency_estimate()))
            .collect();
        let weights = compute_weights(&latencies);

        {
            let mut table = self.weights.write().unwrap_or_else(PoisonError::into_inner);
            for (instance, alive) in self.instances.iter().zip(&aliveness) {
                instance.set_alive(*alive);
            }
            *table = weights.clone();
        }

        for ((instance, alive), weight) in self.instances.iter().zip(&aliveness).zip(&weights) {
            metrics::record_instance_health(instance.authority(), *alive);
            metrics::record_instance_weight(instance.authority(), *weight);
        }

        tracing::info!(
            aliveness = ?aliveness,
            latencies_ns = ?latencies,
            weights = ?weights,
            "Health check complete"
        );
    }

    fn health_check_interval_secs(&self) -> u64 {
        self.health_check_interval_secs
    }

    fn strategy(&self) -> Strategy {
        Strategy::WeightedRoundRobin
    }

    fn snapshot(&self) -> Vec<InstanceStatus> {
        let weights = self.weights.read().unwrap_or_else(PoisonError::into_inner);
        self.instances
            .iter()
            .zip(weights.iter())
            .map(|(i, weight)| InstanceStatus {
                address: i.url().to_string(),
                alive: i.is_alive(),
                latency_ns: i.latency_estimate(),
                weight: Some(*weight),
            })
            .collect()
    }
}
