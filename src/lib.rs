// Public modules
pub mod types;
pub mod error;
pub mod config;
pub mod parsing;
pub mod kubernetes;
pub mod metrics;
pub mod collector;
pub mod report;
pub mod observability;
pub mod connectivity;
pub mod monitor;
pub mod server;

// Re-export commonly used items
pub use types::*;
pub use error::{Error, ErrorKind, Result};
pub use config::{load_config, load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use parsing::{parse_cpu_to_millicores, parse_memory_to_bytes, parse_duration};
pub use kubernetes::{ClusterProvider, DemoProvider, ExecStream, ExitEvidence, KubeProvider};
pub use metrics::*;
pub use collector::{aggregate, HealthCollector};
pub use observability::{init_tracing, ToolboxMetrics};
pub use connectivity::{resolve_command, ConnectivityBridge, ConnectivityRequest, Protocol};
pub use monitor::{Monitor, MonitorSettings, MonitorState};
