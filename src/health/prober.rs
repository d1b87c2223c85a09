//! Active aliveness probing.
//!
//! # Responsibilities
//! - Check whether an instance accepts connections
//! - Bound every probe with a timeout
//!
//! # Design Decisions
//! - A TCP connect is enough; no request is sent
//! - Probe failures are reported as `false`, never as errors

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::net::TcpStream;
use tokio::time;

use crate::load_balancer::instance::Instance;

/// Default connect timeout for a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connectivity check for a single instance.
#[async_trait]
pub trait Prober: Send + Sync + std::fmt::Debug {
    /// Return true if the instance at `authority` (`host:port`) is reachable.
    async fn probe(&self, authority: &str) -> bool;
}

/// Prober that opens (and immediately drops) a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, authority: &str) -> bool {
        match time::timeout(self.timeout, TcpStream::connect(authority)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::warn!(instance = %authority, error = %e, "Probe failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(instance = %authority, timeout = ?self.timeout, "Probe failed: timeout");
                false
            }
        }
    }
}

/// Probe every instance concurrently, returning aliveness in instance order.
pub async fn probe_all(prober: &dyn Prober, instances: &[Instance]) -> Vec<bool> {
    join_all(instances.iter().map(|i| prober.probe(i.authority()))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let prober = TcpProber::default();
        assert!(prober.probe(&addr.to_string()).await);
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let prober = TcpProber::new(Duration::from_millis(500));
        assert!(!prober.probe(&addr.to_string()).await);
    }

    #[tokio::test]
    async fn test_probe_all_preserves_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up = listener.local_addr().unwrap();
        let down = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };

        let instances = vec![
            Instance::parse(&down.to_string()).unwrap(),
            Instance::parse(&up.to_string()).unwrap(),
        ];
        let alive = probe_all(&TcpProber::default(), &instances).await;
        assert_eq!(alive, vec![false, true]);
    }
}
