// Per-pod and per-node analysis
pub mod pods;
pub mod nodes;
pub mod resources;
pub mod base;

// Re-export commonly used items
pub use pods::{evaluate_unit, evaluate_units, RESTART_THRESHOLD};
pub use nodes::{node_info, node_ready_status};
pub use resources::{sum_declared, ResourceRow};
pub use base::{build_usage_map_from_http, list_pod_metrics_http};
