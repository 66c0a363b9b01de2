//! Live usage from the `metrics.k8s.io` API.

use std::collections::HashMap;

use kube::Client;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::parsing::{parse_cpu_to_millicores, parse_memory_to_bytes};
use crate::types::PodUsageTotals;

#[derive(Debug, Default, Deserialize)]
pub struct MetricsMeta {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    #[serde(default)]
    pub usage: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct PodMetricsItem {
    #[serde(default)]
    pub metadata: MetricsMeta,
    #[serde(default)]
    pub containers: Vec<ContainerUsage>,
}

#[derive(Debug, Deserialize)]
struct PodMetricsList {
    items: Vec<PodMetricsItem>,
}

/// Fails when metrics-server is not installed.
pub async fn list_pod_metrics_http(client: &Client, namespace: &str) -> Result<Vec<PodMetricsItem>> {
    let request = http::Request::get(format!("/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods", namespace))
        .body(Vec::new())
        .map_err(|e| Error::internal(format!("build metrics request: {}", e)))?;
    let list: PodMetricsList = client.request(request).await?;
    Ok(list.items)
}

/// Per-pod totals keyed by pod name. Unnamed items are dropped.
pub fn build_usage_map_from_http(items: Vec<PodMetricsItem>) -> HashMap<String, PodUsageTotals> {
    items
        .into_iter()
        .filter_map(|item| {
            let name = item.metadata.name.filter(|n| !n.is_empty())?;
            let totals = item.containers.iter().fold(PodUsageTotals::default(), |mut acc, c| {
                let cpu = c.usage.get("cpu").and_then(|q| parse_cpu_to_millicores(q)).unwrap_or(0);
                let memory = c.usage.get("memory").and_then(|q| parse_memory_to_bytes(q)).unwrap_or(0);
                acc.cpu_millicores = acc.cpu_millicores.saturating_add(cpu);
                acc.memory_bytes = acc.memory_bytes.saturating_add(memory);
                acc
            });
            Some((name, totals))
        })
        .collect()
}
