//! Request forwarding to a chosen instance.
//!
//! # Responsibilities
//! - Rewrite the request URI to point at the instance
//! - Send it upstream and hand back the response unchanged
//!
//! # Design Decisions
//! - The balancer core only sees the `Forwarder` trait
//! - Bodies are streamed, never inspected

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Uri, Version},
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::load_balancer::Instance;

/// Errors raised while forwarding a request.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to build upstream URI: {0}")]
    Uri(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
}

/// Sends a request to a specific instance.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, instance: &Instance, request: Request<Body>) -> Result<Response, ForwardError>;
}

/// Forwarder backed by a pooled hyper client.
#[derive(Debug, Clone)]
pub struct HyperForwarder {
    client: Client<HttpConnector, Body>,
}

impl HyperForwarder {
    pub fn new(connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn forward(&self, instance: &Instance, request: Request<Body>) -> Result<Response, ForwardError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = upstream_uri(instance, &parts.uri)?;
        // The upstream client speaks HTTP/1.1 regardless of the inbound version.
        parts.version = Version::HTTP_11;

        let response = self.client.request(Request::from_parts(parts, body)).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Join the instance's base path with the inbound path and query.
pub fn upstream_uri(instance: &Instance, inbound: &Uri) -> Result<Uri, axum::http::Error> {
    let base = instance.url().path().trim_end_matches('/');
    let path = match inbound.path() {
        "" => "/",
        path => path,
    };
    let path_and_query = match inbound.query() {
        Some(query) => format!("{}{}?{}", base, path, query),
        None => format!("{}{}", base, path),
    };

    Uri::builder()
        .scheme(instance.url().scheme())
        .authority(instance.authority())
        .path_and_query(path_and_query)
        .build()
}
