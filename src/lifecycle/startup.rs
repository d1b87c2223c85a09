//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Initialize subsystems in dependency order
//! - Bind listeners and serve until a shutdown signal
//!
//! Any startup error is fatal and returned to `main`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::{validate_config, ConfigError, LoadBalancerConfig};
use crate::http::LoadBalancerServer;
use crate::lifecycle::{signals, Shutdown};
use crate::load_balancer::BalancerError;
use crate::observability::metrics;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build balancer: {0}")]
    Balancer(#[from] BalancerError),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run the load balancer until SIGINT/SIGTERM.
pub async fn run(config: LoadBalancerConfig) -> Result<(), StartupError> {
    run_until(config, signals::wait_for_signal()).await
}

/// Run the load balancer until `stop` resolves, then drain every listener.
pub async fn run_until<F>(config: LoadBalancerConfig, stop: F) -> Result<(), StartupError>
where
    F: Future<Output = ()>,
{
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        strategy = %config.balancer.strategy,
        instances = ?config.balancer.instances,
        health_check_interval_secs = config.balancer.health_check_interval_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Validated above.
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr)?;
        }
    }

    let server = LoadBalancerServer::new(&config)?;
    let shutdown = Shutdown::new();

    let mut admin_task = None;
    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let router = setup_admin_router(AdminState {
            balancer: server.balancer(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        let mut admin_shutdown = shutdown.subscribe();
        admin_task = Some(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        }));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let result = tokio::select! {
        _ = stop => {
            shutdown.trigger();
            server_task.await
        }
        result = &mut server_task => result,
    };
    shutdown.trigger();

    if let Some(admin_task) = admin_task {
        if let Err(e) = admin_task.await {
            tracing::error!(error = %e, "Admin API task failed");
        }
    }

    result??;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn free_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_admin_listener_drained_before_return() {
        let admin_address = free_port().await;

        let mut config = LoadBalancerConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.balancer.instances = vec!["127.0.0.1:1".into()];
        config.balancer.probe_timeout_ms = 100;
        config.admin.enabled = true;
        config.admin.bind_address = admin_address.clone();

        let admin = admin_address.clone();
        let stop = async move {
            // Up and serving before the stop.
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(tokio::net::TcpStream::connect(&admin).await.is_ok());
        };

        tokio::time::timeout(Duration::from_secs(5), run_until(config, stop))
            .await
            .expect("shutdown hung")
            .unwrap();

        assert!(tokio::net::TcpStream::connect(&admin_address).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_aborts() {
        let config = LoadBalancerConfig::default();
        let err = run_until(config, async {}).await.unwrap_err();
        assert!(matches!(err, StartupError::Config(ConfigError::Validation(_))));
    }
}
