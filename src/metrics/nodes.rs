use k8s_openapi::api::core::v1::Node;

use crate::types::NodeInfo;

/// Read-only view of a node for the query surface.
pub fn node_info(node: &Node) -> NodeInfo {
    let status = node.status.as_ref();
    let system = status.and_then(|s| s.node_info.as_ref());

    let addresses = status
        .and_then(|s| s.addresses.as_ref())
        .map(|addrs| {
            addrs
                .iter()
                .map(|a| format!("{}: {}", a.type_, a.address))
                .collect()
        })
        .unwrap_or_default();

    NodeInfo {
        name: node.metadata.name.clone().unwrap_or_default(),
        status: node_ready_status(node).to_string(),
        addresses,
        kubelet_version: system.map(|i| i.kubelet_version.clone()).unwrap_or_default(),
        kernel_version: system.map(|i| i.kernel_version.clone()).unwrap_or_default(),
        os_image: system.map(|i| i.os_image.clone()).unwrap_or_default(),
        container_runtime: system.map(|i| i.container_runtime_version.clone()).unwrap_or_default(),
        pressure: extract_pressure_conditions(node),
        labels: node.metadata.labels.clone().unwrap_or_default(),
    }
}

/// "Ready", "NotReady", or "Unknown" when the node reports no Ready condition.
pub fn node_ready_status(node: &Node) -> &'static str {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .map(|c| if c.status == "True" { "Ready" } else { "NotReady" })
        .unwrap_or("Unknown")
}

fn extract_pressure_conditions(node: &Node) -> Vec<String> {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .filter(|c| {
                    matches!(c.type_.as_str(), "MemoryPressure" | "DiskPressure" | "PIDPressure")
                        && c.status == "True"
                })
                .map(|c| c.type_.clone())
                .collect()
        })
        .unwrap_or_default()
}
