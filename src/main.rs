use std::future::Future;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kube_toolbox::config::load_config;
use kube_toolbox::connectivity::{ConnectivityBridge, ConnectivityRequest, Protocol};
use kube_toolbox::monitor::{Monitor, MonitorSettings};
use kube_toolbox::parsing::parse_duration;
use kube_toolbox::report::{write_diagnosis, write_resource_table};
use kube_toolbox::server::{self, AppState, Credentials};
use kube_toolbox::{
    init_tracing, ClusterProvider, Config, DemoProvider, Error, HealthCollector, KubeProvider, OutcomeStatus,
    OutputSink, ToolboxMetrics,
};

#[derive(Debug, Parser)]
#[command(name = "kube-toolbox", version, about = "Kubernetes health, connectivity and resource diagnostics")]
struct Cli {
    /// Overall timeout for one-shot commands (e.g. 500ms, 30s, 1m30s). Defaults to DEFAULT_TIMEOUT.
    #[arg(long, global = true, value_parser = parse_duration)]
    timeout: Option<Duration>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Evaluate pod health in a namespace
    Healthcheck {
        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// Probe a destination from inside a pod
    Connectivity {
        #[arg(short, long, default_value = "default")]
        namespace: String,
        /// Pod to run the probe from
        #[arg(long)]
        pod: Option<String>,
        /// Destination host, service or IP
        #[arg(long)]
        target: Option<String>,
        /// tcp, http or icmp
        #[arg(long, default_value = "tcp")]
        protocol: String,
        #[arg(long, default_value_t = 80)]
        port: u16,
    },
    /// Show declared pod resources in a namespace
    Resources {
        #[arg(short, long, default_value = "default")]
        namespace: String,
        /// Usage percentage of requests that triggers a warning
        #[arg(long, default_value_t = 80.0)]
        threshold: f64,
    },
    /// Run health checks on an interval until interrupted
    Monitor {
        #[arg(short, long, default_value = "default")]
        namespace: String,
        #[arg(short, long, default_value = "30s", value_parser = parse_duration)]
        interval: Duration,
        #[arg(short, long, value_enum, default_value_t = OutputSink::Stdout)]
        output: OutputSink,
    },
    /// Run the enabled HTTP servers until interrupted
    Server,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let cfg = load_config()?;
    init_tracing(&cfg.log_level, cfg.log_format);

    if let Commands::Version = cli.command {
        println!(
            "kube-toolbox {} (built {}, commit {})",
            server::VERSION,
            server::build_time(),
            server::git_commit()
        );
        return Ok(ExitCode::SUCCESS);
    }

    // Arguments are validated before any cluster call.
    let connectivity = match &cli.command {
        Commands::Connectivity { namespace, pod, target, protocol, port } => {
            let request = ConnectivityRequest::from_args(namespace.clone(), pod.clone(), target.clone(), protocol.clone(), *port)?;
            request.protocol.parse::<Protocol>()?;
            Some(request)
        }
        _ => None,
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        signal_token.cancel();
    });

    let provider: Arc<dyn ClusterProvider> = if cfg.standalone_mode {
        info!("Running in standalone mode, serving demo data");
        Arc::new(DemoProvider)
    } else {
        Arc::new(
            KubeProvider::connect(cfg.kubeconfig.as_deref())
                .await
                .context("Failed to connect to Kubernetes cluster")?,
        )
    };
    let metrics = ToolboxMetrics::new()?;
    let servers = spawn_servers(&cfg, provider.clone(), metrics.clone(), &cancel);

    let timeout = cli.timeout.unwrap_or(cfg.default_timeout);
    let collector = HealthCollector::new(provider.clone(), metrics.clone());
    let waits_for_signal = !servers.is_empty();

    let code = match cli.command {
        Commands::Healthcheck { namespace } => {
            let summary = bounded(timeout, collector.check_namespace(&namespace)).await?;
            write_diagnosis(&summary, &mut std::io::stdout())?;
            ExitCode::SUCCESS
        }
        Commands::Connectivity { .. } => {
            let request = connectivity.context("connectivity request was not validated")?;
            let bridge = ConnectivityBridge::new(provider.clone(), metrics.clone());
            let outcome = bridge
                .check(&request, timeout, &cancel, &mut tokio::io::stdout(), &mut tokio::io::stderr())
                .await?;
            match outcome.status {
                OutcomeStatus::Success => {
                    println!("Connectivity test from {} to {} succeeded", outcome.pod, outcome.target);
                    ExitCode::SUCCESS
                }
                OutcomeStatus::Failure | OutcomeStatus::Error => {
                    eprintln!(
                        "Connectivity test from {} to {} {}: {}",
                        outcome.pod, outcome.target, outcome.status, outcome.evidence
                    );
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Resources { namespace, threshold } => {
            let rows = bounded(timeout, collector.collect_resources(&namespace, threshold)).await?;
            write_resource_table(&namespace, &rows, &mut std::io::stdout())?;
            ExitCode::SUCCESS
        }
        Commands::Monitor { namespace, interval, output } => {
            let settings = MonitorSettings::new(namespace, interval, output);
            let mut monitor = Monitor::new(collector);
            monitor.run(&settings, cancel.clone(), &mut std::io::stdout()).await?;
            info!(cycles = monitor.cycles(), failed = monitor.failed_cycles(), "Monitoring stopped");
            ExitCode::SUCCESS
        }
        Commands::Server => {
            if !waits_for_signal {
                warn!("Neither ENABLE_WEB_UI nor ENABLE_PROMETHEUS is set, nothing to serve");
            }
            ExitCode::SUCCESS
        }
        Commands::Version => ExitCode::SUCCESS,
    };

    if waits_for_signal {
        info!("Servers running, waiting for shutdown signal");
        cancel.cancelled().await;
    }
    cancel.cancel();
    for handle in servers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Server exited with error"),
            Err(e) => error!(error = %e, "Server task panicked"),
        }
    }

    Ok(code)
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> kube_toolbox::Result<T>
where
    F: Future<Output = kube_toolbox::Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(Error::DeadlineExceeded(timeout)))
}

fn spawn_servers(
    cfg: &Config,
    provider: Arc<dyn ClusterProvider>,
    metrics: ToolboxMetrics,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<kube_toolbox::Result<()>>> {
    let mut handles = Vec::new();

    if cfg.enable_web_ui {
        let credentials = Credentials::from_config(cfg);
        if credentials.as_ref().is_some_and(|c| c.password.is_empty()) {
            warn!("ENABLE_AUTH is set but AUTH_PASSWORD is empty");
        }
        let state = AppState::new(provider, metrics.clone(), credentials);
        let addr = SocketAddr::from(([0, 0, 0, 0], cfg.web_ui_port));
        handles.push(tokio::spawn(server::serve("web-ui", addr, server::web_router(state), cancel.clone())));
    }

    if cfg.enable_prometheus {
        let addr = SocketAddr::from(([0, 0, 0, 0], cfg.prometheus_port));
        handles.push(tokio::spawn(server::serve("metrics", addr, server::metrics_router(metrics), cancel.clone())));
    }

    handles
}
