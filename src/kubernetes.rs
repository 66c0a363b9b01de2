//! Cluster snapshot provider: the boundary between the toolbox and the
//! Kubernetes API.

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;

use async_trait::async_trait;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{AttachParams, AttachedProcess, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::metrics::base::{build_usage_map_from_http, list_pod_metrics_http};
use crate::metrics::nodes::node_info;
use crate::types::{
    ContainerResources, ContainerState, NodeInfo, Phase, PodUsageTotals, ServiceInfo,
    UnitCondition, WorkloadUnit,
};

pub type ExecOutput = Pin<Box<dyn AsyncRead + Send>>;

/// Exit evidence reported by a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitEvidence {
    pub code: Option<i32>,
    pub message: Option<String>,
}

impl ExitEvidence {
    pub fn exited(code: i32) -> Self {
        Self { code: Some(code), message: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running remote command. Dropping it tears the session down.
pub struct ExecStream {
    pub stdout: Option<ExecOutput>,
    pub stderr: Option<ExecOutput>,
    pub completion: BoxFuture<'static, Result<ExitEvidence>>,
}

#[async_trait]
pub trait ClusterProvider: Send + Sync {
    async fn list_units(&self, namespace: &str) -> Result<Vec<WorkloadUnit>>;

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>>;

    async fn list_services(&self, namespace: &str) -> Result<Vec<ServiceInfo>>;

    async fn list_namespaces(&self) -> Result<Vec<String>>;

    /// Live usage per pod name, from the metrics API.
    async fn unit_usage(&self, namespace: &str) -> Result<HashMap<String, PodUsageTotals>>;

    /// `container = None` selects the first container of the pod.
    async fn open_exec_stream(
        &self,
        namespace: &str,
        unit: &str,
        container: Option<&str>,
        command: &[String],
    ) -> Result<ExecStream>;

    /// Reported by `/api/v1/health`.
    fn mode(&self) -> &'static str {
        "kubernetes"
    }
}

pub struct KubeProvider {
    client: Client,
}

impl KubeProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Uses the given kubeconfig path, or infers in-cluster / default config.
    pub async fn connect(kubeconfig: Option<&str>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                info!(kubeconfig = %path, "Using kubeconfig");
                let kc = Kubeconfig::read_from(path)
                    .map_err(|e| Error::transport(format!("read kubeconfig {}: {}", path, e)))?;
                let cfg = kube::Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::transport(format!("load kubeconfig {}: {}", path, e)))?;
                Client::try_from(cfg)?
            }
            None => Client::try_default().await?,
        };
        Ok(Self::new(client))
    }

    async fn first_container(&self, namespace: &str, unit: &str) -> Result<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods.get(unit).await?;
        pod.spec
            .and_then(|s| s.containers.into_iter().next())
            .map(|c| c.name)
            .ok_or_else(|| Error::transport(format!("pod {}/{} has no containers", namespace, unit)))
    }
}

#[async_trait]
impl ClusterProvider for KubeProvider {
    async fn list_units(&self, namespace: &str) -> Result<Vec<WorkloadUnit>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(workload_unit).collect())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(node_info).collect())
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<ServiceInfo>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let list = services.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(service_info).collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces.list(&ListParams::default()).await?;
        Ok(list.items.into_iter().filter_map(|ns| ns.metadata.name).collect())
    }

    async fn unit_usage(&self, namespace: &str) -> Result<HashMap<String, PodUsageTotals>> {
        let items = list_pod_metrics_http(&self.client, namespace).await?;
        Ok(build_usage_map_from_http(items))
    }

    async fn open_exec_stream(
        &self,
        namespace: &str,
        unit: &str,
        container: Option<&str>,
        command: &[String],
    ) -> Result<ExecStream> {
        let container = match container {
            Some(c) => c.to_string(),
            None => self.first_container(namespace, unit).await?,
        };
        debug!(namespace, pod = unit, container = %container, ?command, "Opening exec stream");

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true)
            .tty(false);
        let mut attached = pods.exec(unit, command.to_vec(), &params).await?;

        let stdout = attached.stdout().map(|s| Box::pin(s) as ExecOutput);
        let stderr = attached.stderr().map(|s| Box::pin(s) as ExecOutput);
        let status = attached
            .take_status()
            .ok_or_else(|| Error::transport("exec stream has no status channel"))?;

        let guard = AbortOnDrop(attached);
        let completion = Box::pin(async move {
            let status = status.await;
            // keep the session alive until the status arrives
            drop(guard);
            match status {
                Some(s) => Ok(exit_evidence(&s)),
                None => Err(Error::transport("exec stream closed without a status")),
            }
        });

        Ok(ExecStream { stdout, stderr, completion })
    }
}

struct AbortOnDrop(AttachedProcess);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Maps the exec status frame to an exit code. Non-zero exits arrive as
/// `Failure` with an `ExitCode` cause.
pub fn exit_evidence(status: &Status) -> ExitEvidence {
    if status.status.as_deref() == Some("Success") {
        return ExitEvidence::exited(0);
    }
    let code = status
        .details
        .as_ref()
        .and_then(|d| d.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|c| c.reason.as_deref() == Some("ExitCode"))
                .and_then(|c| c.message.as_ref())
                .and_then(|m| m.trim().parse().ok())
        });
    ExitEvidence { code, message: status.message.clone() }
}

/// Converts a pod into the read-only view evaluated by the toolbox. Absent
/// status lists become empty lists.
pub fn workload_unit(pod: &Pod) -> WorkloadUnit {
    let status = pod.status.as_ref();

    let containers = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|cs| ContainerState {
                    name: cs.name.clone(),
                    ready: cs.ready,
                    restart_count: cs.restart_count,
                })
                .collect()
        })
        .unwrap_or_default();

    let conditions = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| UnitCondition {
                    type_: c.type_.clone(),
                    status: c.status.clone(),
                    message: c.message.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    let resources = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .map(|c| {
                    let requests = c.resources.as_ref().and_then(|r| r.requests.as_ref());
                    let limits = c.resources.as_ref().and_then(|r| r.limits.as_ref());
                    let quantity = |map: Option<&BTreeMap<String, Quantity>>, key: &str| {
                        map.and_then(|m| m.get(key)).map(|q| q.0.clone())
                    };
                    ContainerResources {
                        name: c.name.clone(),
                        cpu_request: quantity(requests, "cpu"),
                        cpu_limit: quantity(limits, "cpu"),
                        memory_request: quantity(requests, "memory"),
                        memory_limit: quantity(limits, "memory"),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    WorkloadUnit {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        phase: Phase::parse(status.and_then(|s| s.phase.as_deref())),
        containers,
        conditions,
        resources,
        labels: pod.metadata.labels.clone().unwrap_or_default(),
    }
}

pub fn service_info(svc: &Service) -> ServiceInfo {
    let spec = svc.spec.as_ref();
    let ports = spec
        .and_then(|s| s.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .map(|p| format!("{}/{}", p.port, p.protocol.as_deref().unwrap_or("TCP")))
                .collect()
        })
        .unwrap_or_default();
    let external_ips = svc
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| ingress.iter().filter_map(|i| i.ip.clone()).filter(|ip| !ip.is_empty()).collect())
        .unwrap_or_default();

    ServiceInfo {
        name: svc.metadata.name.clone().unwrap_or_default(),
        namespace: svc.metadata.namespace.clone().unwrap_or_default(),
        type_: spec.and_then(|s| s.type_.clone()).unwrap_or_default(),
        cluster_ip: spec.and_then(|s| s.cluster_ip.clone()).unwrap_or_default(),
        external_ips,
        ports,
        labels: svc.metadata.labels.clone().unwrap_or_default(),
    }
}

/// Fixed demo data for running without a cluster.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoProvider;

const DEMO_UNAVAILABLE: &str = "not available in standalone mode";

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn demo_unit(name: &str, namespace: &str, phase: Phase, ready: bool, tier: &str) -> WorkloadUnit {
    let mut unit = WorkloadUnit::new(name, namespace, phase);
    unit.containers = vec![ContainerState { name: "app".to_string(), ready, restart_count: 0 }];
    unit.resources = vec![ContainerResources {
        name: "app".to_string(),
        cpu_request: Some("100m".to_string()),
        cpu_limit: Some("500m".to_string()),
        memory_request: Some("128Mi".to_string()),
        memory_limit: Some("256Mi".to_string()),
    }];
    unit.labels = labels(&[("app", "example"), ("tier", tier)]);
    unit
}

fn demo_node(name: &str, address: &str, role: &str) -> NodeInfo {
    NodeInfo {
        name: name.to_string(),
        status: "Ready".to_string(),
        addresses: vec![format!("InternalIP: {}", address), format!("Hostname: {}", name)],
        kubelet_version: "v1.28.3".to_string(),
        kernel_version: "5.15.0-86-generic".to_string(),
        os_image: "Ubuntu 22.04.3 LTS".to_string(),
        container_runtime: "containerd://1.7.4".to_string(),
        pressure: Vec::new(),
        labels: labels(&[("kubernetes.io/hostname", name), (role, "")]),
    }
}

#[async_trait]
impl ClusterProvider for DemoProvider {
    async fn list_units(&self, namespace: &str) -> Result<Vec<WorkloadUnit>> {
        Ok(vec![
            demo_unit("example-pod-1", namespace, Phase::Running, true, "frontend"),
            demo_unit("example-pod-2", namespace, Phase::Running, true, "backend"),
            demo_unit("example-pod-3", namespace, Phase::Pending, false, "database"),
        ])
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        Ok(vec![
            demo_node("example-node-1", "192.168.1.10", "node-role.kubernetes.io/control-plane"),
            demo_node("example-node-2", "192.168.1.11", "node-role.kubernetes.io/worker"),
        ])
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<ServiceInfo>> {
        Ok(vec![
            ServiceInfo {
                name: "example-service-1".to_string(),
                namespace: namespace.to_string(),
                type_: "ClusterIP".to_string(),
                cluster_ip: "10.96.0.10".to_string(),
                external_ips: Vec::new(),
                ports: vec!["80/TCP".to_string(), "443/TCP".to_string()],
                labels: labels(&[("app", "example"), ("tier", "frontend")]),
            },
            ServiceInfo {
                name: "example-service-2".to_string(),
                namespace: namespace.to_string(),
                type_: "LoadBalancer".to_string(),
                cluster_ip: "10.96.0.11".to_string(),
                external_ips: vec!["192.168.1.100".to_string()],
                ports: vec!["8080/TCP".to_string()],
                labels: labels(&[("app", "example"), ("tier", "backend")]),
            },
        ])
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        Ok(["default", "kube-system", "demo"].map(String::from).to_vec())
    }

    async fn unit_usage(&self, _namespace: &str) -> Result<HashMap<String, PodUsageTotals>> {
        Err(Error::transport(format!("live usage {}", DEMO_UNAVAILABLE)))
    }

    async fn open_exec_stream(
        &self,
        _namespace: &str,
        _unit: &str,
        _container: Option<&str>,
        _command: &[String],
    ) -> Result<ExecStream> {
        Err(Error::transport(format!("exec {}", DEMO_UNAVAILABLE)))
    }

    fn mode(&self) -> &'static str {
        "standalone"
    }
}
