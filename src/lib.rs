//! Latency-aware load balancer.
//!
//! Routes requests across a fixed set of backend instances using either
//! round robin or latency-weighted round robin, while a background health
//! check keeps aliveness and weights current.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::LoadBalancerConfig;
pub use http::LoadBalancerServer;
pub use lifecycle::Shutdown;
pub use load_balancer::{Balancer, BalancerError, Strategy};
