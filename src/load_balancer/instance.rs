//! Backend instance abstraction.
//!
//! # Responsibilities
//! - Represent a single backend instance
//! - Hold the aliveness flag written by health checks
//! - Own the latency estimator fed by the dispatcher

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

use crate::load_balancer::error::BalancerError;
use crate::load_balancer::ewma::Ewma;

/// A single backend instance.
#[derive(Debug)]
pub struct Instance {
    /// Base URL requests are forwarded to.
    url: Url,
    /// `host:port` used for connectivity probes.
    authority: String,
    /// Whether the last health check reached the instance.
    alive: AtomicBool,
    /// Smoothed response latency in nanoseconds.
    latency: Ewma,
}

impl Instance {
    /// Parse an instance from a URL (`http://host:port`) or a bare `host:port`.
    pub fn parse(address: &str) -> Result<Self, BalancerError> {
        let address = address.trim();
        let url = match Url::parse(address) {
            Ok(url) if url.has_host() => url,
            // `localhost:8081` parses as scheme `localhost`, path `8081`.
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(&format!("http://{}", address)).map_err(|source| {
                    BalancerError::InvalidAddress {
                        address: address.to_string(),
                        source,
                    }
                })?
            }
            Err(source) => {
                return Err(BalancerError::InvalidAddress {
                    address: address.to_string(),
                    source,
                })
            }
        };

        if url.scheme() != "http" {
            return Err(BalancerError::UnsupportedScheme {
                address: address.to_string(),
                scheme: url.scheme().to_string(),
            });
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BalancerError::MissingHost(address.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| BalancerError::MissingHost(address.to_string()))?;
        let authority = format!("{}:{}", host, port);

        Ok(Self {
            url,
            authority,
            alive: AtomicBool::new(true),
            latency: Ewma::default(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host:port` of the instance.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    /// Current latency estimate in nanoseconds.
    pub fn latency_estimate(&self) -> f64 {
        self.latency.get()
    }

    /// Feed one observed response time into the estimator.
    pub fn record_latency(&self, elapsed: Duration) {
        self.latency.observe_duration(elapsed);
    }

    #[cfg(test)]
    pub(crate) fn seed_latency(&self, nanos: f64) {
        self.latency.set(nanos);
    }
}
