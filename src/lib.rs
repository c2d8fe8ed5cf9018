// Public modules
pub mod calculator;
pub mod collector;
pub mod config;
pub mod crd;
pub mod engine;
pub mod error;
pub mod health;
pub mod index;
pub mod kubernetes;
pub mod metrics;
pub mod parsing;
pub mod publisher;
pub mod report;
pub mod runtime;
pub mod scheduler;
pub mod server;
pub mod types;
pub mod watch;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use types::*;
pub use calculator::calculate_snapshot;
pub use config::{load_config, load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use crd::{tenant_info_name, TenantInfo, TenantInfoSpec};
pub use error::{Error, Result};
pub use health::{score_snapshot, HealthPolicy};
pub use index::{SharedTenantIndex, TenantIndex};
pub use metrics::TenantMetrics;
pub use parsing::{parse_cpu_to_millicores, parse_memory_to_bytes, format_cpu, format_memory};
pub use report::ClusterSummary;
