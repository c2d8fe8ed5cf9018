use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::health::HealthPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub operator_name: String,
    pub operator_namespace: String,
    /// Pod name, used as the event reporter instance.
    pub instance_name: Option<String>,
    pub tenant_label: String,
    pub health_policy: HealthPolicy,
    pub debounce: Duration,
    pub resync_interval: Duration,
    pub worker_concurrency: usize,
    pub publish_max_attempts: u32,
    pub failure_event_threshold: u32,
    pub health_port: u16,
}

/// Allocatable capacity summed over schedulable nodes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClusterCapacity {
    pub cpu_millicores: i64,
    pub memory_bytes: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PodCounts {
    pub running: u32,
    pub pending: u32,
    pub failed: u32,
    pub succeeded: u32,
}

impl PodCounts {
    pub fn total(&self) -> u32 {
        self.running
            .saturating_add(self.pending)
            .saturating_add(self.failed)
            .saturating_add(self.succeeded)
    }
}

/// Aggregate footprint of one tenant, recomputed on every pass.
///
/// Limit sums only include containers that declare a limit; the matching
/// `*_limits_complete` flag records whether every counted container did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkloadSnapshot {
    pub namespaces: Vec<String>,
    pub cpu_requested_millicores: i64,
    pub cpu_limit_millicores: i64,
    pub cpu_limits_complete: bool,
    pub memory_requested_bytes: i64,
    pub memory_limit_bytes: i64,
    pub memory_limits_complete: bool,
    pub containers_missing_requests: u32,
    pub pods: PodCounts,
    pub service_count: u32,
    pub deployment_count: u32,
    pub statefulset_count: u32,
    pub config_map_count: u32,
    pub secret_count: u32,
    pub capacity: Option<ClusterCapacity>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum HealthStatus {
    Ready,
    Degraded,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ready => "Ready",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthScore {
    /// Always within `[0, 100]`.
    pub score: f64,
    pub status: HealthStatus,
    /// Set when the score fell below the degraded floor.
    pub critical: bool,
}
