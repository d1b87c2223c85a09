//! Per-request dispatch.
//!
//! # Data Flow
//! ```text
//! Request
//!     → Balancer::select_instance
//!         - no alive instance → 503, stop
//!     → Forwarder::forward (timed, bounded by the request timeout)
//!         - transport error → 502
//!         - no response headers in time → 504
//!     → upstream response returned with its body wrapped
//!     → Balancer::record_latency once the body ends, errors or is dropped
//! ```
//!
//! # Design Decisions
//! - No retry against another instance here; the selector's bounded
//!   attempts are the only retry
//! - Every forward attempt feeds the estimator, failed and timed-out ones
//!   included, so an instance that accepts connections but never answers
//!   loses weight on the next sweep

use std::sync::Arc;
use std::task::Poll;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{stream, StreamExt};

use crate::http::forward::Forwarder;
use crate::http::request::request_id;
use crate::load_balancer::Balancer;
use crate::observability::metrics;

/// Entry point for every balanced request.
pub struct Dispatcher {
    balancer: Arc<dyn Balancer>,
    forwarder: Arc<dyn Forwarder>,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(balancer: Arc<dyn Balancer>, forwarder: Arc<dyn Forwarder>, request_timeout: Duration) -> Self {
        Self {
            balancer,
            forwarder,
            request_timeout,
        }
    }

    pub fn balancer(&self) -> &Arc<dyn Balancer> {
        &self.balancer
    }

    /// Select an instance, forward, and feed the observed latency back.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let request_id = request_id(request.headers()).to_string();
        let method = request.method().to_string();

        let selected = self
            .balancer
            .select_instance()
            .map(|index| (index, self.balancer.instances().get(index)));

        let (index, instance) = match selected {
            Ok((index, Some(instance))) => (index, instance),
            Ok((index, None)) => {
                tracing::error!(request_id = %request_id, index, "Selected index out of range");
                return unavailable(&method, start);
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Failed to find any alive instance");
                return unavailable(&method, start);
            }
        };

        let upstream = instance.authority();
        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %request.uri().path(),
            instance = index,
            upstream = %upstream,
            "Dispatching request"
        );

        // Records on drop, whichever way the forward ends.
        let timer = LatencyTimer::start(self.balancer.clone(), index);
        let forwarded = tokio::time::timeout(self.request_timeout, self.forwarder.forward(instance, request)).await;

        match forwarded {
            Ok(Ok(response)) => {
                tracing::debug!(
                    request_id = %request_id,
                    instance = index,
                    status = %response.status(),
                    "Upstream responded"
                );
                metrics::record_request(&method, response.status().as_u16(), upstream, start);
                response.map(|body| timed_body(body, timer))
            }
            Ok(Err(e)) => {
                tracing::error!(request_id = %request_id, instance = index, upstream = %upstream, error = %e, "Upstream error");
                metrics::record_request(&method, StatusCode::BAD_GATEWAY.as_u16(), upstream, start);
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    instance = index,
                    upstream = %upstream,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Upstream timed out"
                );
                metrics::record_request(&method, StatusCode::GATEWAY_TIMEOUT.as_u16(), upstream, start);
                (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out").into_response()
            }
        }
    }
}

/// Feeds the time since construction to the balancer when dropped.
struct LatencyTimer {
    balancer: Arc<dyn Balancer>,
    index: usize,
    start: Instant,
}

impl LatencyTimer {
    fn start(balancer: Arc<dyn Balancer>, index: usize) -> Self {
        Self {
            balancer,
            index,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        self.balancer.record_latency(self.index, elapsed);
        tracing::trace!(instance = self.index, elapsed_ns = elapsed.as_nanos() as u64, "Latency recorded");
    }
}

/// Stream `body` through unchanged, stopping `timer` at end of stream.
///
/// A body dropped early (client gone, read error) stops the timer on drop.
fn timed_body(body: Body, timer: LatencyTimer) -> Body {
    let mut timer = Some(timer);
    let finish = stream::poll_fn(move |_| {
        drop(timer.take());
        Poll::Ready(None)
    });
    Body::from_stream(body.into_data_stream().chain(finish))
}

fn unavailable(method: &str, start: Instant) -> Response {
    metrics::record_selection_failure();
    metrics::record_request(method, StatusCode::SERVICE_UNAVAILABLE.as_u16(), "none", start);
    (StatusCode::SERVICE_UNAVAILABLE, "No alive instance").into_response()
}
