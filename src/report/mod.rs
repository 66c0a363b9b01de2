use std::io::{self, Write};

use chrono::SecondsFormat;
use tracing::debug;

use crate::metrics::ResourceRow;
use crate::parsing::{compute_utilization_percentages, format_bytes, format_millicores};
use crate::types::{NamespaceSummary, OutputSink};

/// One-line count summary used by the stdout sink.
pub fn summary_line(summary: &NamespaceSummary) -> String {
    format!(
        "Health check at {}: {} healthy pods, {} unhealthy pods",
        summary.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        summary.healthy_pods,
        summary.unhealthy_pods
    )
}

/// Send a summary to exactly one sink.
pub fn dispatch<W: Write>(sink: OutputSink, summary: &NamespaceSummary, out: &mut W) -> io::Result<()> {
    match sink {
        OutputSink::Stdout => writeln!(out, "{}", summary_line(summary)),
        OutputSink::Json => {
            serde_json::to_writer(&mut *out, summary)?;
            writeln!(out)
        }
        OutputSink::MetricsOnly => {
            // counters were updated during aggregation
            debug!(namespace = %summary.namespace, "Metrics updated");
            Ok(())
        }
    }
}

/// Human-readable diagnosis for the one-shot healthcheck.
pub fn write_diagnosis<W: Write>(summary: &NamespaceSummary, out: &mut W) -> io::Result<()> {
    writeln!(out, "Health checks on namespace '{}'", summary.namespace)?;
    if summary.pod_details.is_empty() {
        writeln!(out, "No pods found in namespace '{}'", summary.namespace)?;
    }
    for pod in &summary.pod_details {
        if pod.is_healthy() {
            writeln!(out, "✅ Pod {} is healthy", pod.name)?;
        } else {
            writeln!(out, "⚠️ Pod {} is not healthy (Status: {})", pod.name, pod.phase)?;
            for issue in &pod.issues {
                writeln!(out, "  - {}", issue)?;
            }
        }
    }
    writeln!(
        out,
        "Health check summary: {} healthy pods, {} unhealthy pods",
        summary.healthy_pods, summary.unhealthy_pods
    )
}

pub fn write_resource_table<W: Write>(namespace: &str, rows: &[ResourceRow], out: &mut W) -> io::Result<()> {
    if rows.is_empty() {
        return writeln!(out, "No pods found in namespace '{}'", namespace);
    }
    writeln!(out, "Resource allocation in namespace '{}' (requested resources):", namespace)?;
    writeln!(
        out,
        "{:<40} {:<10} {:<10} {:<10} {:<10} {}",
        "POD", "CPU REQ", "CPU LIM", "MEM REQ", "MEM LIM", "USAGE"
    )?;
    writeln!(out, "{}", "-".repeat(90))?;
    for row in rows {
        writeln!(
            out,
            "{:<40} {:<10} {:<10} {:<10} {:<10} {}",
            row.pod,
            format_millicores(row.requests.cpu_millicores),
            format_millicores(row.limits.cpu_millicores),
            format_bytes(row.requests.memory_bytes),
            format_bytes(row.limits.memory_bytes),
            usage_cell(row)
        )?;
    }
    Ok(())
}

fn usage_cell(row: &ResourceRow) -> String {
    let Some(usage) = row.usage.as_ref() else {
        return "-".to_string();
    };
    let (cpu_pct, mem_pct) = compute_utilization_percentages(usage, &row.requests);
    let pct = |v: Option<f64>| v.map(|v| format!("{:.0}%", v)).unwrap_or_else(|| "-".to_string());
    format!("cpu {} mem {}", pct(cpu_pct), pct(mem_pct))
}
