use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Config {
    pub enable_web_ui: bool,
    pub web_ui_port: u16,
    pub enable_auth: bool,
    pub auth_username: String,
    pub auth_password: String,
    pub enable_prometheus: bool,
    pub prometheus_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub kubeconfig: Option<String>,
    pub default_timeout: Duration,
    /// Serve demo data instead of talking to a cluster.
    pub standalone_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Coarse lifecycle state reported for a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl Phase {
    /// Unrecognised or missing phases map to `Unknown`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("Pending") => Phase::Pending,
            Some("Running") => Phase::Running,
            Some("Succeeded") => Phase::Succeeded,
            Some("Failed") => Phase::Failed,
            _ => Phase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Running => "Running",
            Phase::Succeeded => "Succeeded",
            Phase::Failed => "Failed",
            Phase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerState {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitCondition {
    pub type_: String,
    pub status: String,
    pub message: Option<String>,
}

/// Declared requests/limits of one container, as raw quantity strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerResources {
    pub name: String,
    pub cpu_request: Option<String>,
    pub cpu_limit: Option<String>,
    pub memory_request: Option<String>,
    pub memory_limit: Option<String>,
}

/// Read-only view of a pod for one evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadUnit {
    pub name: String,
    pub namespace: String,
    pub phase: Phase,
    pub containers: Vec<ContainerState>,
    pub conditions: Vec<UnitCondition>,
    pub resources: Vec<ContainerResources>,
    pub labels: BTreeMap<String, String>,
}

impl WorkloadUnit {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, phase: Phase) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            phase,
            containers: Vec::new(),
            conditions: Vec::new(),
            resources: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn all_containers_ready(&self) -> bool {
        self.containers.iter().all(|c| c.ready)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitHealth {
    pub name: String,
    #[serde(rename = "status")]
    pub phase: Phase,
    pub issues: Vec<String>,
}

impl UnitHealth {
    /// A unit is healthy only when it is Running with no recorded issues.
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty() && self.phase == Phase::Running
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSummary {
    pub namespace: String,
    pub healthy_pods: usize,
    pub unhealthy_pods: usize,
    pub pod_details: Vec<UnitHealth>,
    pub timestamp: DateTime<Utc>,
}

impl NamespaceSummary {
    pub fn empty(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            healthy_pods: 0,
            unhealthy_pods: 0,
            pod_details: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn total(&self) -> usize {
        self.healthy_pods + self.unhealthy_pods
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Cpu,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityKind {
    Request,
    Limit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSample {
    pub pod: String,
    pub resource: ResourceKind,
    pub quantity: QuantityKind,
    pub value: f64,
}

impl ResourceSample {
    /// Label value used for the resource gauge.
    pub fn resource_type(&self) -> &'static str {
        match (self.resource, self.quantity) {
            (ResourceKind::Cpu, QuantityKind::Request) => "cpu_request",
            (ResourceKind::Cpu, QuantityKind::Limit) => "cpu_limit",
            (ResourceKind::Memory, QuantityKind::Request) => "memory_request",
            (ResourceKind::Memory, QuantityKind::Limit) => "memory_limit",
        }
    }
}

/// Live usage of one pod summed over its containers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PodUsageTotals {
    pub cpu_millicores: i64,
    pub memory_bytes: i64,
}

/// Declared quantities summed over a pod's containers; `None` when no
/// container declares the quantity.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PodRequestTotals {
    pub cpu_millicores: Option<i64>,
    pub memory_bytes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Failure => "failure",
            OutcomeStatus::Error => "error",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityOutcome {
    pub namespace: String,
    pub pod: String,
    pub target: String,
    pub protocol: String,
    pub status: OutcomeStatus,
    pub evidence: String,
}

/// Where the monitoring loop sends each summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputSink {
    Stdout,
    Json,
    /// Metrics are already updated during aggregation; suppresses console output.
    #[value(name = "prometheus", alias = "metrics")]
    MetricsOnly,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub ready: bool,
    pub labels: BTreeMap<String, String>,
}

impl From<&WorkloadUnit> for PodInfo {
    fn from(unit: &WorkloadUnit) -> Self {
        Self {
            name: unit.name.clone(),
            namespace: unit.namespace.clone(),
            status: unit.phase.to_string(),
            ready: unit.all_containers_ready(),
            labels: unit.labels.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(rename = "clusterIP")]
    pub cluster_ip: String,
    #[serde(rename = "externalIP", skip_serializing_if = "Vec::is_empty")]
    pub external_ips: Vec<String>,
    pub ports: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    pub status: String,
    pub addresses: Vec<String>,
    pub kubelet_version: String,
    pub kernel_version: String,
    #[serde(rename = "osImage")]
    pub os_image: String,
    pub container_runtime: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pressure: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

/// Uniform envelope for every HTTP response.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, message: None, data: Some(data), error: None }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, message: None, data: None, error: Some(error.into()) }
    }
}
