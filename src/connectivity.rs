//! Connectivity checks run from inside a pod.
//!
//! A check resolves a fixed diagnostic command for the protocol, runs it in
//! the pod's first container, and forwards the remote stdout/stderr to the
//! caller while the stream is open. Outcomes:
//!
//! - `success`: the remote command exited 0
//! - `failure`: the remote command ran and exited non-zero
//! - `error`: the stream could not be opened or sustained, the deadline
//!   elapsed, or the check was cancelled

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::kubernetes::{ClusterProvider, ExecOutput, ExecStream, ExitEvidence};
use crate::observability::ToolboxMetrics;
use crate::types::{ConnectivityOutcome, OutcomeStatus};

/// Internal timeout handed to `nc`.
pub const TCP_PROBE_TIMEOUT_SECS: u32 = 5;
/// Internal timeout handed to `curl`.
pub const HTTP_PROBE_TIMEOUT_SECS: u32 = 10;
pub const ICMP_PROBE_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Http,
    Icmp,
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "http" => Ok(Protocol::Http),
            "icmp" => Ok(Protocol::Icmp),
            other => Err(Error::validation(format!(
                "invalid protocol: {}. Must be one of: tcp, http, icmp",
                other
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Icmp => "icmp",
        })
    }
}

impl Protocol {
    pub fn command(&self, target: &str, port: u16) -> Vec<String> {
        match self {
            Protocol::Tcp => vec![
                "nc".into(),
                "-zv".into(),
                "-w".into(),
                TCP_PROBE_TIMEOUT_SECS.to_string(),
                target.into(),
                port.to_string(),
            ],
            Protocol::Http => vec![
                "curl".into(),
                "-sSf".into(),
                "-m".into(),
                HTTP_PROBE_TIMEOUT_SECS.to_string(),
                "-o".into(),
                "/dev/null".into(),
                format!("http://{}:{}", target, port),
            ],
            Protocol::Icmp => vec![
                "ping".into(),
                "-c".into(),
                ICMP_PROBE_COUNT.to_string(),
                target.into(),
            ],
        }
    }
}

/// Resolve the diagnostic command for a protocol name. `port` is ignored for icmp.
pub fn resolve_command(protocol: &str, target: &str, port: u16) -> Result<Vec<String>> {
    Ok(protocol.parse::<Protocol>()?.command(target, port))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityRequest {
    pub namespace: String,
    pub pod: String,
    pub target: String,
    pub protocol: String,
    pub port: u16,
}

impl ConnectivityRequest {
    /// Builds a request from raw CLI/API arguments; pod and target are required.
    pub fn from_args(
        namespace: impl Into<String>,
        pod: Option<String>,
        target: Option<String>,
        protocol: impl Into<String>,
        port: u16,
    ) -> Result<Self> {
        let pod = pod.filter(|p| !p.trim().is_empty());
        let target = target.filter(|t| !t.trim().is_empty());
        match (pod, target) {
            (Some(pod), Some(target)) => Ok(Self {
                namespace: namespace.into(),
                pod,
                target,
                protocol: protocol.into(),
                port,
            }),
            _ => Err(Error::validation(
                "please specify both pod name and target for connectivity check",
            )),
        }
    }
}

pub struct ConnectivityBridge {
    provider: Arc<dyn ClusterProvider>,
    metrics: ToolboxMetrics,
}

impl ConnectivityBridge {
    pub fn new(provider: Arc<dyn ClusterProvider>, metrics: ToolboxMetrics) -> Self {
        Self { provider, metrics }
    }

    /// Run one check bounded by `deadline`. Invalid protocols fail before any
    /// cluster call; every other path yields an outcome and bumps exactly one
    /// connectivity counter.
    pub async fn check<O, E>(
        &self,
        request: &ConnectivityRequest,
        deadline: Duration,
        cancel: &CancellationToken,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<ConnectivityOutcome>
    where
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        let protocol: Protocol = request.protocol.parse()?;
        let command = protocol.command(&request.target, request.port);
        info!(
            namespace = %request.namespace,
            pod = %request.pod,
            destination = %request.target,
            %protocol,
            "Testing connectivity"
        );

        let exec = self.stream(request, &command, stdout, stderr);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            r = tokio::time::timeout(deadline, exec) => {
                r.unwrap_or(Err(Error::DeadlineExceeded(deadline)))
            }
        };

        let (status, evidence) = match result {
            Ok(exit) if exit.success() => (OutcomeStatus::Success, "exit code 0".to_string()),
            Ok(exit) => (OutcomeStatus::Failure, describe_exit(&exit)),
            Err(e) => (OutcomeStatus::Error, e.to_string()),
        };

        match status {
            OutcomeStatus::Success => info!(destination = %request.target, "Connectivity test succeeded"),
            OutcomeStatus::Failure => warn!(destination = %request.target, %evidence, "Connectivity test failed"),
            OutcomeStatus::Error => error!(destination = %request.target, %evidence, "Connectivity test could not complete"),
        }
        self.metrics.record_connectivity(&request.namespace, &request.target, status);

        Ok(ConnectivityOutcome {
            namespace: request.namespace.clone(),
            pod: request.pod.clone(),
            target: request.target.clone(),
            protocol: protocol.to_string(),
            status,
            evidence,
        })
    }

    async fn stream<O, E>(
        &self,
        request: &ConnectivityRequest,
        command: &[String],
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<ExitEvidence>
    where
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        let ExecStream { stdout: remote_out, stderr: remote_err, completion } = self
            .provider
            .open_exec_stream(&request.namespace, &request.pod, None, command)
            .await?;

        let (out, err, exit) = tokio::join!(
            forward(remote_out, stdout),
            forward(remote_err, stderr),
            completion,
        );
        out?;
        err?;
        exit
    }
}

async fn forward<W>(source: Option<ExecOutput>, sink: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + Send,
{
    let Some(mut source) = source else {
        return Ok(0);
    };
    let copied = tokio::io::copy(&mut source, sink)
        .await
        .map_err(|e| Error::transport(format!("forward remote output: {}", e)))?;
    sink.flush()
        .await
        .map_err(|e| Error::transport(format!("flush remote output: {}", e)))?;
    Ok(copied)
}

fn describe_exit(exit: &ExitEvidence) -> String {
    match (exit.code, exit.message.as_deref()) {
        (Some(code), Some(msg)) => format!("exit code {}: {}", code, msg),
        (Some(code), None) => format!("exit code {}", code),
        (None, Some(msg)) => msg.to_string(),
        (None, None) => "remote command failed".to_string(),
    }
}
