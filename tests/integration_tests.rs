mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kube_toolbox::{
    aggregate, evaluate_units, ConnectivityBridge, ConnectivityRequest, ErrorKind, HealthCollector, Monitor,
    MonitorSettings, MonitorState, OutcomeStatus, OutputSink, Phase, PodUsageTotals, ToolboxMetrics,
};
use tokio_util::sync::CancellationToken;

use common::{container, declared, unit, ExecScript, MockProvider};

fn collector(provider: Arc<MockProvider>) -> (HealthCollector, ToolboxMetrics) {
    let metrics = ToolboxMetrics::new().unwrap();
    (HealthCollector::new(provider, metrics.clone()), metrics)
}

fn bridge(provider: Arc<MockProvider>) -> (ConnectivityBridge, ToolboxMetrics) {
    let metrics = ToolboxMetrics::new().unwrap();
    (ConnectivityBridge::new(provider, metrics.clone()), metrics)
}

fn request(protocol: &str) -> ConnectivityRequest {
    ConnectivityRequest::from_args("prod", Some("client-0".into()), Some("db".into()), protocol, 5432).unwrap()
}

fn connectivity_total(metrics: &ToolboxMetrics) -> u64 {
    [OutcomeStatus::Success, OutcomeStatus::Failure, OutcomeStatus::Error]
        .into_iter()
        .map(|status| metrics.connectivity_checks("prod", status, "db"))
        .sum()
}

#[tokio::test]
async fn test_three_unit_namespace() {
    let provider = Arc::new(MockProvider::new(vec![
        unit("web-0", Phase::Running, vec![container("web", true, 0)]),
        unit("worker-0", Phase::Running, vec![container("worker", true, 7)]),
        unit("batch-0", Phase::Pending, vec![container("batch", true, 0)]),
    ]));
    let (collector, metrics) = collector(provider);

    let summary = collector.check_namespace("prod").await.unwrap();

    assert_eq!(summary.healthy_pods, 1);
    assert_eq!(summary.unhealthy_pods, 2);
    assert_eq!(summary.pod_details[1].issues, vec!["Container worker has restarted 7 times"]);
    assert!(summary.pod_details[2].issues.is_empty());
    assert!(!summary.pod_details[2].is_healthy());
    assert_eq!(metrics.checks("prod", "healthy"), 1);
    assert_eq!(metrics.checks("prod", "unhealthy"), 2);
}

#[tokio::test]
async fn test_empty_namespace_records_nothing() {
    let provider = Arc::new(MockProvider::new(Vec::new()));
    let (collector, metrics) = collector(provider);

    let summary = collector.check_namespace("prod").await.unwrap();

    assert_eq!(summary.healthy_pods, 0);
    assert_eq!(summary.unhealthy_pods, 0);
    assert_eq!(metrics.total_checks(), 0);
}

#[test]
fn test_aggregate_partitions_every_unit() {
    let phases = [Phase::Pending, Phase::Running, Phase::Succeeded, Phase::Failed, Phase::Unknown];
    let mut units = Vec::new();
    for (i, phase) in phases.iter().enumerate() {
        for ready in [true, false] {
            for restarts in [0, 6] {
                units.push(unit(&format!("p{}-{}-{}", i, ready, restarts), *phase, vec![container("c", ready, restarts)]));
            }
        }
    }
    let metrics = ToolboxMetrics::new().unwrap();

    let summary = aggregate("prod", evaluate_units(&units), &metrics);

    assert_eq!(summary.healthy_pods + summary.unhealthy_pods, units.len());
    assert_eq!(summary.healthy_pods, 1);
    assert_eq!(metrics.total_checks(), units.len() as u64);
}

#[tokio::test]
async fn test_provider_failure_surfaces_as_transport_error() {
    let provider = Arc::new(MockProvider::failing("connection refused"));
    let (collector, metrics) = collector(provider);

    let err = collector.check_namespace("prod").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(metrics.total_checks(), 0);
}

#[tokio::test]
async fn test_resources_publish_gauges_and_usage() {
    let mut api = unit("api-0", Phase::Running, vec![container("app", true, 0)]);
    api.resources = vec![declared("app", "250m", "256Mi")];
    let bare = unit("bare-0", Phase::Running, Vec::new());
    let usage = HashMap::from([(
        "api-0".to_string(),
        PodUsageTotals { cpu_millicores: 225, memory_bytes: 64 * 1024 * 1024 },
    )]);
    let provider = Arc::new(MockProvider::new(vec![api, bare]).with_usage(usage));
    let (collector, metrics) = collector(provider);

    let rows = collector.collect_resources("prod", 80.0).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].usage.as_ref().map(|u| u.cpu_millicores), Some(225));
    assert!(rows[1].usage.is_none());
    assert_eq!(metrics.resource("prod", "api-0", "cpu_request"), 0.25);
    assert_eq!(metrics.resource("prod", "api-0", "memory_request"), 256.0 * 1024.0 * 1024.0);
}

#[tokio::test]
async fn test_resources_without_metrics_api() {
    let mut api = unit("api-0", Phase::Running, Vec::new());
    api.resources = vec![declared("app", "1", "1Gi")];
    let provider = Arc::new(MockProvider::new(vec![api]));
    let (collector, _) = collector(provider);

    let rows = collector.collect_resources("prod", 80.0).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].requests.cpu_millicores, Some(1000));
    assert!(rows[0].usage.is_none());
}

#[tokio::test]
async fn test_bogus_protocol_makes_no_remote_call() {
    let provider = Arc::new(MockProvider::new(Vec::new()));
    let (bridge, metrics) = bridge(provider.clone());

    let err = bridge
        .check(&request("bogus"), Duration::from_secs(5), &CancellationToken::new(), &mut tokio::io::sink(), &mut tokio::io::sink())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(provider.exec_calls(), 0);
    assert_eq!(connectivity_total(&metrics), 0);
}

#[tokio::test]
async fn test_deadline_classifies_as_error() {
    let provider = Arc::new(MockProvider::new(Vec::new()).with_exec(ExecScript::Hang));
    let (bridge, metrics) = bridge(provider.clone());

    let outcome = bridge
        .check(&request("tcp"), Duration::from_millis(1), &CancellationToken::new(), &mut tokio::io::sink(), &mut tokio::io::sink())
        .await
        .unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert_eq!(metrics.connectivity_checks("prod", OutcomeStatus::Error, "db"), 1);
    assert_eq!(connectivity_total(&metrics), 1);
    assert_eq!(provider.exec_calls(), 1);
}

#[tokio::test]
async fn test_cancellation_classifies_as_error() {
    let provider = Arc::new(MockProvider::new(Vec::new()).with_exec(ExecScript::Hang));
    let (bridge, metrics) = bridge(provider);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = bridge
        .check(&request("icmp"), Duration::from_secs(60), &cancel, &mut tokio::io::sink(), &mut tokio::io::sink())
        .await
        .unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert_eq!(outcome.evidence, "operation cancelled");
    assert_eq!(connectivity_total(&metrics), 1);
}

#[tokio::test]
async fn test_successful_probe_forwards_output() {
    let provider = Arc::new(MockProvider::new(Vec::new()).with_exec(ExecScript::Exit {
        code: 0,
        stdout: b"db (10.96.0.5:5432) open\n".to_vec(),
        stderr: b"note\n".to_vec(),
    }));
    let (bridge, metrics) = bridge(provider.clone());
    let mut out: Vec<u8> = Vec::new();
    let mut err: Vec<u8> = Vec::new();

    let outcome = bridge
        .check(&request("TCP"), Duration::from_secs(5), &CancellationToken::new(), &mut out, &mut err)
        .await
        .unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.protocol, "tcp");
    assert_eq!(out, b"db (10.96.0.5:5432) open\n");
    assert_eq!(err, b"note\n");
    assert_eq!(metrics.connectivity_checks("prod", OutcomeStatus::Success, "db"), 1);
    let command = provider.last_command.lock().unwrap().clone().unwrap();
    assert_eq!(command, vec!["nc", "-zv", "-w", "5", "db", "5432"]);
}

#[tokio::test]
async fn test_nonzero_exit_is_failure() {
    let provider = Arc::new(MockProvider::new(Vec::new()).with_exec(ExecScript::Exit {
        code: 1,
        stdout: Vec::new(),
        stderr: b"connection refused\n".to_vec(),
    }));
    let (bridge, metrics) = bridge(provider);

    let outcome = bridge
        .check(&request("http"), Duration::from_secs(5), &CancellationToken::new(), &mut tokio::io::sink(), &mut tokio::io::sink())
        .await
        .unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Failure);
    assert_eq!(outcome.evidence, "exit code 1");
    assert_eq!(metrics.connectivity_checks("prod", OutcomeStatus::Failure, "db"), 1);
    assert_eq!(connectivity_total(&metrics), 1);
}

#[tokio::test]
async fn test_stream_open_failure_is_error() {
    let provider = Arc::new(MockProvider::new(Vec::new()).with_exec(ExecScript::Fail("pod not found".into())));
    let (bridge, metrics) = bridge(provider);

    let outcome = bridge
        .check(&request("tcp"), Duration::from_secs(5), &CancellationToken::new(), &mut tokio::io::sink(), &mut tokio::io::sink())
        .await
        .unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert!(outcome.evidence.contains("pod not found"));
    assert_eq!(metrics.connectivity_checks("prod", OutcomeStatus::Error, "db"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycles_delay_ticks_without_skipping() {
    let provider = Arc::new(
        MockProvider::new(vec![unit("web-0", Phase::Running, vec![container("web", true, 0)])])
            .with_list_delay(Duration::from_secs(8)),
    );
    let (collector, metrics) = collector(provider.clone());
    let mut monitor = Monitor::new(collector);
    let settings = MonitorSettings::new("prod", Duration::from_secs(10), OutputSink::Stdout);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        // 16s cycles start at 10s, 26s and 42s; the third is running at 50s
        tokio::time::sleep(Duration::from_secs(50)).await;
        trigger.cancel();
    });

    let mut out: Vec<u8> = Vec::new();
    monitor.run(&settings, cancel, &mut out).await.unwrap();

    assert_eq!(monitor.cycles(), 3);
    assert_eq!(monitor.failed_cycles(), 0);
    assert_eq!(provider.list_calls(), 6);
    assert_eq!(metrics.checks("prod", "healthy"), 3);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.matches("Health check at").count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_cycle_lets_cycle_finish() {
    let provider = Arc::new(
        MockProvider::new(vec![unit("web-0", Phase::Running, vec![container("web", true, 0)])])
            .with_list_delay(Duration::from_secs(5)),
    );
    let (collector, metrics) = collector(provider.clone());
    let mut monitor = Monitor::new(collector);
    let settings = MonitorSettings::new("prod", Duration::from_secs(10), OutputSink::Stdout);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        // first cycle starts at 10s and is still listing at 12s
        tokio::time::sleep(Duration::from_secs(12)).await;
        trigger.cancel();
    });

    let mut out: Vec<u8> = Vec::new();
    monitor.run(&settings, cancel, &mut out).await.unwrap();

    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert_eq!(monitor.cycles(), 1);
    assert_eq!(provider.list_calls(), 2);
    assert_eq!(metrics.checks("prod", "healthy"), 1);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.matches("Health check at").count(), 1);
    assert!(text.contains("web-0"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_interval_stops_ticking() {
    let provider = Arc::new(MockProvider::new(vec![unit("web-0", Phase::Running, vec![container("web", true, 0)])]));
    let (collector, metrics) = collector(provider);
    let mut monitor = Monitor::new(collector);
    let settings = MonitorSettings::new("prod", Duration::from_secs(10), OutputSink::MetricsOnly);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(25)).await;
        trigger.cancel();
    });

    let mut out: Vec<u8> = Vec::new();
    monitor.run(&settings, cancel, &mut out).await.unwrap();

    assert_eq!(monitor.cycles(), 2);
    assert_eq!(metrics.checks("prod", "healthy"), 2);
    assert!(out.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_json_sink_emits_one_record_per_cycle() {
    let provider = Arc::new(MockProvider::new(vec![
        unit("web-0", Phase::Running, vec![container("web", true, 0)]),
        unit("web-1", Phase::Running, vec![container("web", false, 0)]),
    ]));
    let (collector, _) = collector(provider);
    let mut monitor = Monitor::new(collector);
    let settings = MonitorSettings::new("prod", Duration::from_secs(10), OutputSink::Json);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();
    });

    let mut out: Vec<u8> = Vec::new();
    monitor.run(&settings, cancel, &mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["namespace"], "prod");
    assert_eq!(record["healthyPods"], 1);
    assert_eq!(record["unhealthyPods"], 1);
    assert_eq!(record["podDetails"][1]["issues"][0], "Container web is not ready");
}

#[tokio::test(start_paused = true)]
async fn test_monitor_survives_failing_provider() {
    let provider = Arc::new(MockProvider::failing("connection refused"));
    let (collector, _) = collector(provider.clone());
    let mut monitor = Monitor::new(collector);
    let settings = MonitorSettings::new("prod", Duration::from_secs(5), OutputSink::Stdout);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(22)).await;
        trigger.cancel();
    });

    monitor.run(&settings, cancel, &mut std::io::sink()).await.unwrap();

    assert_eq!(monitor.cycles(), 4);
    assert_eq!(monitor.failed_cycles(), 4);
    // a failed evaluation skips the resource pass for that cycle
    assert_eq!(provider.list_calls(), 4);
}
