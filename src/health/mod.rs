//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! scheduler.rs:
//!     Periodic timer
//!     → Balancer::run_health_check
//!         → prober.rs (TCP connect per instance, concurrently)
//!         → update aliveness (and weights, for weighted round robin)
//! ```
//!
//! # Design Decisions
//! - Probes run before any balancer lock is taken
//! - A failed probe only marks its own instance dead
//! - Sweeps never overlap

pub mod prober;
pub mod scheduler;

pub use prober::{Prober, TcpProber};
pub use scheduler::HealthCheckScheduler;
