use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::load_balancer::InstanceStatus;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub strategy: String,
    pub health_check_interval_secs: u64,
    pub instances: usize,
    pub alive_instances: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let balancer = &state.balancer;
    let instances = balancer.instances();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        strategy: balancer.strategy().to_string(),
        health_check_interval_secs: balancer.health_check_interval_secs(),
        instances: instances.len(),
        alive_instances: instances.iter().filter(|i| i.is_alive()).count(),
    })
}

pub async fn get_instances(State(state): State<AdminState>) -> Json<Vec<InstanceStatus>> {
    Json(state.balancer.snapshot())
}
