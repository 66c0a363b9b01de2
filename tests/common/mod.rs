#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use kube_toolbox::{
    ClusterProvider, ContainerResources, ContainerState, Error, ExecStream, ExitEvidence, NodeInfo, Phase,
    PodUsageTotals, Result, ServiceInfo, WorkloadUnit,
};

/// How the mock answers `open_exec_stream`.
#[derive(Debug, Clone)]
pub enum ExecScript {
    Exit { code: i32, stdout: Vec<u8>, stderr: Vec<u8> },
    /// The stream opens but the remote command never completes.
    Hang,
    /// The stream cannot be opened.
    Fail(String),
}

pub struct MockProvider {
    units: Vec<WorkloadUnit>,
    usage: Option<HashMap<String, PodUsageTotals>>,
    fail_lists: Option<String>,
    list_delay: Option<Duration>,
    exec: ExecScript,
    pub list_calls: AtomicUsize,
    pub exec_calls: AtomicUsize,
    pub last_namespace: Mutex<Option<String>>,
    pub last_command: Mutex<Option<Vec<String>>>,
}

impl MockProvider {
    pub fn new(units: Vec<WorkloadUnit>) -> Self {
        Self {
            units,
            usage: None,
            fail_lists: None,
            list_delay: None,
            exec: ExecScript::Exit { code: 0, stdout: Vec::new(), stderr: Vec::new() },
            list_calls: AtomicUsize::new(0),
            exec_calls: AtomicUsize::new(0),
            last_namespace: Mutex::new(None),
            last_command: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut provider = Self::new(Vec::new());
        provider.fail_lists = Some(message.to_string());
        provider
    }

    pub fn with_usage(mut self, usage: HashMap<String, PodUsageTotals>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn with_exec(mut self, exec: ExecScript) -> Self {
        self.exec = exec;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn exec_calls(&self) -> usize {
        self.exec_calls.load(Ordering::SeqCst)
    }

    fn check_lists(&self) -> Result<()> {
        match &self.fail_lists {
            Some(message) => Err(Error::transport(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClusterProvider for MockProvider {
    async fn list_units(&self, namespace: &str) -> Result<Vec<WorkloadUnit>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_namespace.lock().unwrap() = Some(namespace.to_string());
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_lists()?;
        Ok(self.units.clone())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        self.check_lists()?;
        Ok(vec![NodeInfo {
            name: "node-1".to_string(),
            status: "Ready".to_string(),
            addresses: vec!["10.0.0.10".to_string()],
            kubelet_version: "v1.26.3".to_string(),
            kernel_version: "5.15.0".to_string(),
            os_image: "Ubuntu 22.04".to_string(),
            container_runtime: "containerd://1.7.0".to_string(),
            pressure: Vec::new(),
            labels: Default::default(),
        }])
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<ServiceInfo>> {
        self.check_lists()?;
        Ok(vec![ServiceInfo {
            name: "web".to_string(),
            namespace: namespace.to_string(),
            type_: "ClusterIP".to_string(),
            cluster_ip: "10.96.0.20".to_string(),
            external_ips: Vec::new(),
            ports: vec!["80/TCP".to_string()],
            labels: Default::default(),
        }])
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        self.check_lists()?;
        Ok(vec!["default".to_string(), "kube-system".to_string()])
    }

    async fn unit_usage(&self, _namespace: &str) -> Result<HashMap<String, PodUsageTotals>> {
        self.usage
            .clone()
            .ok_or_else(|| Error::transport("metrics API not available"))
    }

    async fn open_exec_stream(
        &self,
        _namespace: &str,
        _unit: &str,
        _container: Option<&str>,
        command: &[String],
    ) -> Result<ExecStream> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_command.lock().unwrap() = Some(command.to_vec());
        match self.exec.clone() {
            ExecScript::Exit { code, stdout, stderr } => Ok(ExecStream {
                stdout: Some(Box::pin(Cursor::new(stdout))),
                stderr: Some(Box::pin(Cursor::new(stderr))),
                completion: Box::pin(async move { Ok(ExitEvidence::exited(code)) }),
            }),
            ExecScript::Hang => Ok(ExecStream {
                stdout: None,
                stderr: None,
                completion: Box::pin(std::future::pending()),
            }),
            ExecScript::Fail(message) => Err(Error::transport(message)),
        }
    }
}

pub fn container(name: &str, ready: bool, restarts: i32) -> ContainerState {
    ContainerState {
        name: name.to_string(),
        ready,
        restart_count: restarts,
    }
}

pub fn unit(name: &str, phase: Phase, containers: Vec<ContainerState>) -> WorkloadUnit {
    let mut unit = WorkloadUnit::new(name, "prod", phase);
    unit.containers = containers;
    unit
}

pub fn declared(name: &str, cpu_request: &str, memory_request: &str) -> ContainerResources {
    ContainerResources {
        name: name.to_string(),
        cpu_request: Some(cpu_request.to_string()),
        memory_request: Some(memory_request.to_string()),
        ..Default::default()
    }
}
