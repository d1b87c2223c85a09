//! Latency-aware load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                LOAD BALANCER                 │
//!                     │                                              │
//!   Client Request    │  ┌──────────┐   ┌────────────┐   ┌────────┐  │
//!   ──────────────────┼─▶│   http   │──▶│  balancer  │──▶│forward │──┼──▶ Instance N
//!                     │  │  server  │   │  (select)  │   │        │  │
//!                     │  └──────────┘   └─────▲──────┘   └───┬────┘  │
//!                     │                       │ latency      │       │
//!                     │                       └──────────────┘       │
//!                     │                                              │
//!                     │  ┌──────────────┐  probe every instance      │
//!                     │  │ health check │─────────────────────────────┼──▶ Instances
//!                     │  │  scheduler   │  → aliveness, weights      │
//!                     │  └──────────────┘                            │
//!                     └──────────────────────────────────────────────┘
//! ```
//!
//! Usage:
//!
//! ```text
//! latency-balancer --port 8080 --urls http://localhost:8081,http://localhost:8082
//! latency-balancer --config balancer.toml --strategy weighted-round-robin
//! ```

use std::path::PathBuf;

use clap::Parser;

use latency_balancer::config::{read_config, LoadBalancerConfig};
use latency_balancer::lifecycle::startup;
use latency_balancer::observability::logging;
use latency_balancer::Strategy;

#[derive(Parser, Debug)]
#[command(name = "latency-balancer", version)]
#[command(about = "Round-robin and latency-weighted load balancer", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (binds 0.0.0.0).
    #[arg(short, long)]
    port: Option<u16>,

    /// Instance addresses, comma separated.
    #[arg(short, long, value_delimiter = ',')]
    urls: Vec<String>,

    /// Selection strategy.
    #[arg(short, long, value_enum)]
    strategy: Option<Strategy>,

    /// Seconds between health checks.
    #[arg(long)]
    health_check_interval: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut LoadBalancerConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = format!("0.0.0.0:{}", port);
        }
        if !self.urls.is_empty() {
            config.balancer.instances = self.urls;
        }
        if let Some(strategy) = self.strategy {
            config.balancer.strategy = strategy;
        }
        if let Some(interval) = self.health_check_interval {
            config.balancer.health_check_interval_secs = interval;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => LoadBalancerConfig::default(),
    };
    cli.apply(&mut config);

    logging::init_logging(&config.observability.log_level);
    tracing::info!("latency-balancer v{} starting", env!("CARGO_PKG_VERSION"));

    startup::run(config).await?;
    Ok(())
}
