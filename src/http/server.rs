//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router sending every request to the dispatcher
//! - Wire up middleware (request ID, tracing)
//! - Run the health check scheduler for the lifetime of the server
//! - Stop both on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::LoadBalancerConfig;
use crate::health::{HealthCheckScheduler, TcpProber};
use crate::http::dispatch::Dispatcher;
use crate::http::forward::{Forwarder, HyperForwarder};
use crate::http::request::MakeRequestUuid;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{build_balancer, Balancer, BalancerError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP front end of the load balancer.
pub struct LoadBalancerServer {
    router: Router,
    balancer: Arc<dyn Balancer>,
}

impl LoadBalancerServer {
    /// Build the balancer described by `config` and a server in front of it.
    pub fn new(config: &LoadBalancerConfig) -> Result<Self, BalancerError> {
        let probe_timeout = Duration::from_millis(config.balancer.probe_timeout_ms);
        let balancer = build_balancer(
            config.balancer.strategy,
            config.balancer.instances.as_slice(),
            config.balancer.health_check_interval_secs,
            Arc::new(TcpProber::new(probe_timeout)),
        )?;
        let forwarder = Arc::new(HyperForwarder::new(Duration::from_millis(config.timeouts.connect_ms)));

        Ok(Self::with_balancer(config, balancer, forwarder))
    }

    /// Assemble a server around an existing balancer and forwarder.
    pub fn with_balancer(
        config: &LoadBalancerConfig,
        balancer: Arc<dyn Balancer>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        let state = AppState {
            dispatcher: Arc::new(Dispatcher::new(
                balancer.clone(),
                forwarder,
                Duration::from_secs(config.timeouts.request_secs),
            )),
        };
        let router = Self::build_router(state);
        Self { router, balancer }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The request timeout lives in the dispatcher so a timed-out forward
    /// still reaches the latency estimate.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(dispatch_handler))
            .route("/{*path}", any(dispatch_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn balancer(&self) -> Arc<dyn Balancer> {
        self.balancer.clone()
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires.
    ///
    /// Health checks run for as long as the server does; on shutdown the
    /// scheduler is stopped and joined before this returns.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            strategy = %self.balancer.strategy(),
            instances = self.balancer.instances().len(),
            "Load balancer server starting"
        );

        let scheduler_stop = Shutdown::new();
        let scheduler = HealthCheckScheduler::new(self.balancer.clone()).spawn(scheduler_stop.subscribe());

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        scheduler_stop.trigger();
        if let Err(e) = scheduler.await {
            tracing::error!(error = %e, "Health check scheduler task failed");
        }

        tracing::info!("Load balancer server stopped");
        served
    }
}

async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.dispatcher.dispatch(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::forward::ForwardError;
    use crate::http::request::X_REQUEST_ID;
    use crate::load_balancer::testing::ScriptedProber;
    use crate::load_balancer::{Instance, Strategy};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use tower::ServiceExt;

    /// Answers with the instance authority as the body.
    struct EchoInstance;

    #[async_trait]
    impl Forwarder for EchoInstance {
        async fn forward(&self, instance: &Instance, request: Request<Body>) -> Result<Response, ForwardError> {
            let body = format!("{} {}", instance.authority(), request.uri().path());
            Ok((StatusCode::OK, body).into_response())
        }
    }

    fn server() -> LoadBalancerServer {
        let mut config = LoadBalancerConfig::default();
        config.balancer.instances = vec!["localhost:8081".into(), "localhost:8082".into()];
        let balancer = build_balancer(
            Strategy::RoundRobin,
            config.balancer.instances.as_slice(),
            1,
            Arc::new(ScriptedProber::default()),
        )
        .unwrap();
        LoadBalancerServer::with_balancer(&config, balancer, Arc::new(EchoInstance))
    }

    #[tokio::test]
    async fn test_routes_any_path_and_sets_request_id() {
        let server = server();
        let response = server
            .router()
            .oneshot(Request::post("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"localhost:8082 /echo");
    }

    #[tokio::test]
    async fn test_keeps_client_request_id() {
        let server = server();
        let response = server
            .router()
            .oneshot(
                Request::get("/")
                    .header(X_REQUEST_ID, "client-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], "client-id");
    }

    #[tokio::test]
    async fn test_all_dead_returns_503() {
        let server = server();
        for instance in server.balancer().instances() {
            instance.set_alive(false);
        }
        let response = server
            .router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let server = server();
        let balancer = server.balancer();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let shutdown = Shutdown::new();
        let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();
        task.await.unwrap().unwrap();

        // The scheduler ran its immediate first sweep.
        assert!(balancer.is_alive(0));
    }
}
