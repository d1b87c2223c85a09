//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: LoadBalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::LoadBalancerConfig;
use crate::load_balancer::{BalancerError, Instance};

/// A single semantic problem in a configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("balancer.instances must not be empty")]
    NoInstances,

    #[error("balancer.instances[{index}]: {source}")]
    Instance {
        index: usize,
        #[source]
        source: BalancerError,
    },

    #[error("balancer.health_check_interval_secs must be greater than 0")]
    ZeroHealthCheckInterval,

    #[error("balancer.probe_timeout_ms must be greater than 0")]
    ZeroProbeTimeout,

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroRequestTimeout,

    #[error("timeouts.connect_ms must be greater than 0")]
    ZeroConnectTimeout,

    #[error("{field}: `{value}` is not a valid socket address")]
    BindAddress { field: &'static str, value: String },
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &LoadBalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.balancer.instances.is_empty() {
        errors.push(ValidationError::NoInstances);
    }
    for (index, address) in config.balancer.instances.iter().enumerate() {
        if let Err(source) = Instance::parse(address) {
            errors.push(ValidationError::Instance { index, source });
        }
    }

    if config.balancer.health_check_interval_secs == 0 {
        errors.push(ValidationError::ZeroHealthCheckInterval);
    }
    if config.balancer.probe_timeout_ms == 0 {
        errors.push(ValidationError::ZeroProbeTimeout);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }

    check_bind_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_bind_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_bind_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_bind_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress {
            field,
            value: value.to_string(),
        });
    }
}
