//! Periodic namespace monitoring.
//!
//! The loop ticks on a fixed interval. Each cycle evaluates the namespace,
//! dispatches the summary to the configured sink and then runs the resource
//! pass. Cancellation is checked before every cycle; a cycle that already
//! started runs to completion.

use std::io::Write;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::collector::HealthCollector;
use crate::error::{Error, Result};
use crate::report::{dispatch, write_resource_table};
use crate::types::OutputSink;

pub const DEFAULT_THRESHOLD_PERCENT: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub namespace: String,
    pub interval: Duration,
    pub sink: OutputSink,
    pub threshold_percent: f64,
}

impl MonitorSettings {
    pub fn new(namespace: impl Into<String>, interval: Duration, sink: OutputSink) -> Self {
        Self {
            namespace: namespace.into(),
            interval,
            sink,
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
        }
    }
}

pub struct Monitor {
    collector: HealthCollector,
    state: MonitorState,
    cycles: u64,
    failed_cycles: u64,
}

impl Monitor {
    pub fn new(collector: HealthCollector) -> Self {
        Self {
            collector,
            state: MonitorState::Idle,
            cycles: 0,
            failed_cycles: 0,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Cycles started, including failed ones.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles
    }

    /// Run until `cancel` fires. Cycle failures are logged and never end the
    /// loop. A monitor runs once; it ends in `Stopped`.
    pub async fn run<W: Write + Send>(
        &mut self,
        settings: &MonitorSettings,
        cancel: CancellationToken,
        out: &mut W,
    ) -> Result<()> {
        if self.state != MonitorState::Idle {
            return Err(Error::validation("monitor has already been started"));
        }
        if settings.interval.is_zero() {
            return Err(Error::validation("monitoring interval must be greater than zero"));
        }

        self.state = MonitorState::Running;
        info!(
            namespace = %settings.namespace,
            interval_ms = settings.interval.as_millis() as u64,
            sink = ?settings.sink,
            "Starting monitoring loop"
        );

        let mut ticker = interval_at(Instant::now() + settings.interval, settings.interval);
        // a slow cycle pushes the next tick back instead of queueing a burst
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(namespace = %settings.namespace, cycles = self.cycles, "Stopping monitoring loop");
                    break;
                }
                _ = ticker.tick() => {
                    self.cycles += 1;
                    if let Err(e) = self.run_cycle(settings, out).await {
                        self.failed_cycles += 1;
                        error!(namespace = %settings.namespace, cycle = self.cycles, error = %e, "Monitoring cycle failed");
                    }
                }
            }
        }

        self.state = MonitorState::Stopped;
        Ok(())
    }

    async fn run_cycle<W: Write>(&self, settings: &MonitorSettings, out: &mut W) -> Result<()> {
        let namespace = settings.namespace.as_str();
        let summary = self.collector.check_namespace(namespace).await?;
        dispatch(settings.sink, &summary, out).map_err(output_error)?;

        let rows = self
            .collector
            .collect_resources(namespace, settings.threshold_percent)
            .await?;
        // json and metrics sinks keep stdout machine-readable
        if settings.sink == OutputSink::Stdout {
            write_resource_table(namespace, &rows, out).map_err(output_error)?;
        }
        debug!(namespace, healthy = summary.healthy_pods, unhealthy = summary.unhealthy_pods, "Monitoring cycle complete");
        Ok(())
    }
}

fn output_error(e: std::io::Error) -> Error {
    Error::internal(format!("write monitoring output: {}", e))
}
