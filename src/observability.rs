//! Process-wide metrics registry and tracing setup.
//!
//! `ToolboxMetrics` is a cheap handle; clones share one registry, so every
//! task that reports (monitoring loop, HTTP handlers, connectivity checks)
//! receives a clone at startup.

use std::sync::Arc;

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};
use crate::types::{LogFormat, OutcomeStatus, ResourceSample};

struct MetricsInner {
    registry: Registry,
    checks_total: IntCounterVec,
    connectivity_checks_total: IntCounterVec,
    resource_usage: GaugeVec,
}

#[derive(Clone)]
pub struct ToolboxMetrics {
    inner: Arc<MetricsInner>,
}

impl ToolboxMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let checks_total = IntCounterVec::new(
            Opts::new("kube_toolbox_checks_total", "Total number of health checks performed"),
            &["namespace", "status"],
        )
        .map_err(metrics_error)?;
        let connectivity_checks_total = IntCounterVec::new(
            Opts::new(
                "kube_toolbox_connectivity_checks_total",
                "Total number of connectivity checks performed",
            ),
            &["namespace", "status", "target"],
        )
        .map_err(metrics_error)?;
        let resource_usage = GaugeVec::new(
            Opts::new("kube_toolbox_resource_usage", "Declared pod resources collected by kube-toolbox"),
            &["namespace", "pod", "resource_type"],
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(checks_total.clone())).map_err(metrics_error)?;
        registry.register(Box::new(connectivity_checks_total.clone())).map_err(metrics_error)?;
        registry.register(Box::new(resource_usage.clone())).map_err(metrics_error)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                checks_total,
                connectivity_checks_total,
                resource_usage,
            }),
        })
    }

    pub fn record_check(&self, namespace: &str, healthy: bool) {
        let status = if healthy { "healthy" } else { "unhealthy" };
        self.inner.checks_total.with_label_values(&[namespace, status]).inc();
    }

    pub fn record_connectivity(&self, namespace: &str, target: &str, status: OutcomeStatus) {
        self.inner
            .connectivity_checks_total
            .with_label_values(&[namespace, status.as_str(), target])
            .inc();
    }

    pub fn set_resource(&self, namespace: &str, sample: &ResourceSample) {
        self.inner
            .resource_usage
            .with_label_values(&[namespace, &sample.pod, sample.resource_type()])
            .set(sample.value);
    }

    pub fn checks(&self, namespace: &str, status: &str) -> u64 {
        self.inner.checks_total.with_label_values(&[namespace, status]).get()
    }

    pub fn connectivity_checks(&self, namespace: &str, status: OutcomeStatus, target: &str) -> u64 {
        self.inner
            .connectivity_checks_total
            .with_label_values(&[namespace, status.as_str(), target])
            .get()
    }

    pub fn resource(&self, namespace: &str, pod: &str, resource_type: &str) -> f64 {
        self.inner
            .resource_usage
            .with_label_values(&[namespace, pod, resource_type])
            .get()
    }

    /// Sum of every checks counter series, across namespaces and statuses.
    pub fn total_checks(&self) -> u64 {
        self.inner
            .registry
            .gather()
            .iter()
            .filter(|mf| mf.get_name() == "kube_toolbox_checks_total")
            .flat_map(|mf| mf.get_metric().iter())
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }

    /// Text exposition of the whole registry.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::internal(format!("metrics encoding: {}", e)))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::internal(format!("metrics registry: {}", e))
}

/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}
