//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → Balancer::select_instance (cursor.rs: one atomic increment per draw)
//!         - round_robin.rs (skip dead instances)
//!         - weighted.rs (accept/reject draw by weight, then skip dead)
//!     → dispatcher forwards to instance.rs address
//!     → Balancer::record_latency (ewma.rs)
//!
//! Health check tick
//!     → Balancer::run_health_check
//!     → probe every instance, update aliveness
//!     → weighted only: recompute weight table from latency estimates
//! ```
//!
//! # Design Decisions
//! - The instance set is fixed at construction
//! - The cursor is the only state written on the selection hot path
//! - The strategy is chosen once; callers hold `Arc<dyn Balancer>`

pub mod cursor;
pub mod error;
pub mod ewma;
pub mod instance;
pub mod round_robin;
pub mod weighted;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::health::prober::Prober;

pub use error::BalancerError;
pub use instance::Instance;
pub use round_robin::RoundRobin;
pub use weighted::{WeightedRoundRobin, MAX_WEIGHT};

/// Selection algorithm used by a balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Uniform rotation over alive instances.
    #[default]
    RoundRobin,
    /// Rotation weighted by inverse latency.
    WeightedRoundRobin,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::RoundRobin => write!(f, "round_robin"),
            Strategy::WeightedRoundRobin => write!(f, "weighted_round_robin"),
        }
    }
}

/// Point-in-time view of one instance, for the admin API and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceStatus {
    pub address: String,
    pub alive: bool,
    pub latency_ns: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
}

/// Instance selection strategy over a fixed set of instances.
#[async_trait]
pub trait Balancer: Send + Sync + fmt::Debug {
    /// Pick the index of the instance that should serve the next request.
    fn select_instance(&self) -> Result<usize, BalancerError>;

    /// All instances, in construction order.
    fn instances(&self) -> &[Instance];

    /// Whether the instance at `index` passed its last health check.
    fn is_alive(&self, index: usize) -> bool {
        self.instances().get(index).is_some_and(Instance::is_alive)
    }

    /// Feed the observed response time of a request served by `index`.
    fn record_latency(&self, index: usize, elapsed: Duration);

    /// Run one complete health-check sweep.
    async fn run_health_check(&self);

    /// Interval between sweeps, in seconds.
    fn health_check_interval_secs(&self) -> u64;

    fn strategy(&self) -> Strategy;

    fn snapshot(&self) -> Vec<InstanceStatus>;
}

/// Build the balancer for `strategy` over `addresses`.
pub fn build_balancer<S: AsRef<str>>(
    strategy: Strategy,
    addresses: &[S],
    health_check_interval_secs: u64,
    prober: Arc<dyn Prober>,
) -> Result<Arc<dyn Balancer>, BalancerError> {
    let balancer: Arc<dyn Balancer> = match strategy {
        Strategy::RoundRobin => Arc::new(RoundRobin::with_prober(
            addresses,
            health_check_interval_secs,
            prober,
        )?),
        Strategy::WeightedRoundRobin => Arc::new(WeightedRoundRobin::with_prober(
            addresses,
            health_check_interval_secs,
            prober,
        )?),
    };

    tracing::info!(
        strategy = %strategy,
        instances = balancer.instances().len(),
        interval_secs = health_check_interval_secs,
        "Balancer constructed"
    );
    Ok(balancer)
}

/// Parse the construction address list. Fails on the first bad address.
pub(crate) fn parse_instances<S: AsRef<str>>(addresses: &[S]) -> Result<Vec<Instance>, BalancerError> {
    if addresses.is_empty() {
        return Err(BalancerError::EmptyInstanceList);
    }

    addresses
        .iter()
        .map(|address| {
            Instance::parse(address.as_ref()).inspect_err(|e| {
                tracing::error!(address = %address.as_ref(), error = %e, "Invalid instance address");
            })
        })
        .collect()
}
