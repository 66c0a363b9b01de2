use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::kubernetes::ClusterProvider;
use crate::metrics::{evaluate_units, sum_declared, ResourceRow};
use crate::observability::ToolboxMetrics;
use crate::parsing::{any_exceeds, compute_utilization_percentages};
use crate::types::{NamespaceSummary, UnitHealth};

/// Runs namespace-wide passes against the cluster and reports into the
/// shared metrics registry.
#[derive(Clone)]
pub struct HealthCollector {
    provider: Arc<dyn ClusterProvider>,
    metrics: ToolboxMetrics,
}

impl HealthCollector {
    pub fn new(provider: Arc<dyn ClusterProvider>, metrics: ToolboxMetrics) -> Self {
        Self { provider, metrics }
    }

    pub fn metrics(&self) -> &ToolboxMetrics {
        &self.metrics
    }

    /// Evaluate every pod in the namespace and fold the results.
    pub async fn check_namespace(&self, namespace: &str) -> Result<NamespaceSummary> {
        let units = self.provider.list_units(namespace).await?;
        let healths = evaluate_units(&units);
        Ok(aggregate(namespace, healths, &self.metrics))
    }

    /// Sum declared requests/limits per pod and publish one gauge sample per
    /// declared quantity. Live usage, when the metrics API answers, is
    /// compared against requests using `threshold_percent`.
    pub async fn collect_resources(&self, namespace: &str, threshold_percent: f64) -> Result<Vec<ResourceRow>> {
        let units = self.provider.list_units(namespace).await?;
        if units.is_empty() {
            info!(namespace, "No pods found in namespace");
            return Ok(Vec::new());
        }

        let usage = match self.provider.unit_usage(namespace).await {
            Ok(usage) => Some(usage),
            Err(e) => {
                warn!(namespace, error = %e, "Live usage unavailable, reporting declared resources only");
                None
            }
        };

        let mut rows = Vec::with_capacity(units.len());
        for unit in &units {
            let mut row = sum_declared(unit);
            row.usage = usage.as_ref().and_then(|u| u.get(&unit.name)).cloned();

            for sample in row.samples() {
                self.metrics.set_resource(namespace, &sample);
            }

            if let Some(totals) = row.usage.as_ref() {
                let (cpu_pct, mem_pct) = compute_utilization_percentages(totals, &row.requests);
                if any_exceeds(cpu_pct, mem_pct, threshold_percent) == Some(true) {
                    warn!(
                        namespace,
                        pod = %row.pod,
                        cpu_pct = ?cpu_pct,
                        mem_pct = ?mem_pct,
                        threshold = threshold_percent,
                        "Pod usage above threshold"
                    );
                }
            }
            rows.push(row);
        }
        debug!(namespace, pods = rows.len(), "Resource pass complete");
        Ok(rows)
    }
}

/// Fold per-pod health into a namespace summary, counting every pod exactly
/// once in the checks counter.
pub fn aggregate(namespace: &str, healths: Vec<UnitHealth>, metrics: &ToolboxMetrics) -> NamespaceSummary {
    if healths.is_empty() {
        info!(namespace, "No pods found in namespace");
        return NamespaceSummary::empty(namespace);
    }

    let mut healthy_pods = 0;
    let mut unhealthy_pods = 0;
    for health in &healths {
        let healthy = health.is_healthy();
        if healthy {
            healthy_pods += 1;
        } else {
            unhealthy_pods += 1;
        }
        metrics.record_check(namespace, healthy);
    }

    NamespaceSummary {
        namespace: namespace.to_string(),
        healthy_pods,
        unhealthy_pods,
        pod_details: healths,
        timestamp: Utc::now(),
    }
}
