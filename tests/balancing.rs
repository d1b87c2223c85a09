//! End-to-end balancing against real TCP backends.

use std::collections::HashMap;
use std::time::Duration;

use latency_balancer::config::LoadBalancerConfig;
use latency_balancer::Strategy;

mod common;

fn config(strategy: Strategy, instances: Vec<String>, interval_secs: u64) -> LoadBalancerConfig {
    let mut config = LoadBalancerConfig::default();
    config.balancer.strategy = strategy;
    config.balancer.instances = instances;
    config.balancer.health_check_interval_secs = interval_secs;
    config.balancer.probe_timeout_ms = 500;
    config
}

async fn tally(url: &str, requests: usize) -> HashMap<String, usize> {
    let client = common::client();
    let mut counts = HashMap::new();
    for _ in 0..requests {
        let res = client
            .post(url)
            .header("content-type", "application/json")
            .body(r#"{"game":"test"}"#)
            .send()
            .await
            .expect("balancer unreachable");
        assert_eq!(res.status(), 200);
        *counts.entry(res.text().await.unwrap()).or_insert(0) += 1;
    }
    counts
}

#[tokio::test]
async fn test_round_robin_spreads_evenly() {
    let a = common::start_mock_backend("a", Duration::ZERO).await;
    let b = common::start_mock_backend("b", Duration::ZERO).await;
    let c = common::start_mock_backend("c", Duration::ZERO).await;

    let lb = common::start_balancer(config(
        Strategy::RoundRobin,
        vec![format!("http://{}", a), b.to_string(), c.to_string()],
        30,
    ))
    .await;

    let counts = tally(&lb.url("/echo"), 30).await;
    assert_eq!(counts.get("a"), Some(&10));
    assert_eq!(counts.get("b"), Some(&10));
    assert_eq!(counts.get("c"), Some(&10));

    lb.stop().await;
}

#[tokio::test]
async fn test_dead_instance_is_skipped_after_health_check() {
    let a = common::start_mock_backend("a", Duration::ZERO).await;
    let dead = common::closed_port().await;

    let lb = common::start_balancer(config(
        Strategy::RoundRobin,
        vec![a.to_string(), dead.to_string()],
        30,
    ))
    .await;

    let counts = tally(&lb.url("/"), 10).await;
    assert_eq!(counts.get("a"), Some(&10));

    lb.stop().await;
}

#[tokio::test]
async fn test_no_alive_instance_returns_503() {
    let dead_a = common::closed_port().await;
    let dead_b = common::closed_port().await;

    let lb = common::start_balancer(config(
        Strategy::WeightedRoundRobin,
        vec![dead_a.to_string(), dead_b.to_string()],
        30,
    ))
    .await;

    let res = common::client().post(lb.url("/echo")).send().await.unwrap();
    assert_eq!(res.status(), 503);

    lb.stop().await;
}

#[tokio::test]
async fn test_weighted_prefers_faster_instance() {
    let fast = common::start_mock_backend("fast", Duration::ZERO).await;
    let slow = common::start_mock_backend("slow", Duration::from_millis(50)).await;

    let lb = common::start_balancer(config(
        Strategy::WeightedRoundRobin,
        vec![fast.to_string(), slow.to_string()],
        1,
    ))
    .await;

    // Equal weights until a sweep sees the measured latencies.
    let warmup = tally(&lb.url("/"), 10).await;
    assert!(warmup.contains_key("fast"));
    assert!(warmup.contains_key("slow"));

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let counts = tally(&lb.url("/"), 60).await;
    let fast_count = counts.get("fast").copied().unwrap_or(0);
    let slow_count = counts.get("slow").copied().unwrap_or(0);
    assert!(
        fast_count > slow_count * 3,
        "fast {} slow {}",
        fast_count,
        slow_count
    );

    lb.stop().await;
}

#[tokio::test]
async fn test_weighted_moves_traffic_off_hung_instance() {
    let fast = common::start_mock_backend("fast", Duration::ZERO).await;
    let hung = common::start_hung_backend().await;

    let mut config = config(
        Strategy::WeightedRoundRobin,
        vec![fast.to_string(), hung.to_string()],
        1,
    );
    config.timeouts.request_secs = 1;
    let lb = common::start_balancer(config).await;

    // Both start at full weight, so the hung instance gets traffic and times out.
    let client = common::client();
    let mut timeouts = 0;
    for _ in 0..4 {
        let res = client.get(lb.url("/")).send().await.unwrap();
        match res.status().as_u16() {
            200 => assert_eq!(res.text().await.unwrap(), "fast"),
            504 => timeouts += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert!(timeouts >= 1);

    // A sweep turns the recorded timeouts into weight.
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let counts = tally(&lb.url("/"), 10).await;
    assert_eq!(counts.get("fast"), Some(&10));

    lb.stop().await;
}
