//! Health scoring for a tenant's workload snapshot.
//!
//! The score starts at [`MAX_SCORE`] and loses points for high request
//! utilization, failed pods, and pending pods beyond a small tolerance.

use crate::parsing::round2;
use crate::types::{HealthScore, HealthStatus, WorkloadSnapshot};

pub const MAX_SCORE: f64 = 100.0;
pub const MIN_SCORE: f64 = 0.0;

/// Request percentage above which CPU or memory starts costing points.
pub const HIGH_UTILIZATION_PERCENT: f64 = 80.0;
/// Points lost per percentage point of CPU requests above the threshold.
pub const CPU_OVERAGE_WEIGHT: f64 = 1.5;
/// Points lost per percentage point of memory requests above the threshold.
pub const MEMORY_OVERAGE_WEIGHT: f64 = 1.5;

pub const FAILED_POD_PENALTY: f64 = 10.0;
pub const FAILED_POD_PENALTY_CAP: f64 = 40.0;

/// Pending pods tolerated before any penalty applies.
pub const PENDING_POD_TOLERANCE: u32 = 2;
pub const PENDING_POD_PENALTY: f64 = 5.0;

/// Scores at or above this are `Ready`.
pub const READY_THRESHOLD: f64 = 80.0;
/// Scores below this are `Degraded` with the critical flag set.
pub const DEGRADED_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct HealthPolicy {
    pub cpu_threshold_percent: f64,
    pub cpu_overage_weight: f64,
    pub memory_threshold_percent: f64,
    pub memory_overage_weight: f64,
    pub failed_pod_penalty: f64,
    pub failed_pod_penalty_cap: f64,
    pub pending_pod_tolerance: u32,
    pub pending_pod_penalty: f64,
    pub ready_threshold: f64,
    pub degraded_threshold: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            cpu_threshold_percent: HIGH_UTILIZATION_PERCENT,
            cpu_overage_weight: CPU_OVERAGE_WEIGHT,
            memory_threshold_percent: HIGH_UTILIZATION_PERCENT,
            memory_overage_weight: MEMORY_OVERAGE_WEIGHT,
            failed_pod_penalty: FAILED_POD_PENALTY,
            failed_pod_penalty_cap: FAILED_POD_PENALTY_CAP,
            pending_pod_tolerance: PENDING_POD_TOLERANCE,
            pending_pod_penalty: PENDING_POD_PENALTY,
            ready_threshold: READY_THRESHOLD,
            degraded_threshold: DEGRADED_THRESHOLD,
        }
    }
}

impl HealthPolicy {
    /// Same thresholds for CPU and memory; everything else at its default.
    pub fn with_utilization_threshold(threshold_percent: f64) -> Self {
        Self {
            cpu_threshold_percent: threshold_percent,
            memory_threshold_percent: threshold_percent,
            ..Self::default()
        }
    }
}

/// Score a snapshot. Deterministic: the same snapshot and policy always give the same result.
pub fn score_snapshot(snapshot: &WorkloadSnapshot, policy: &HealthPolicy) -> HealthScore {
    let mut score = MAX_SCORE;

    if let Some(cpu) = snapshot.cpu_percent {
        score -= overage(cpu, policy.cpu_threshold_percent) * policy.cpu_overage_weight;
    }
    if let Some(mem) = snapshot.memory_percent {
        score -= overage(mem, policy.memory_threshold_percent) * policy.memory_overage_weight;
    }

    let failed = snapshot.pods.failed as f64 * policy.failed_pod_penalty;
    score -= failed.min(policy.failed_pod_penalty_cap);

    let excess_pending = snapshot.pods.pending.saturating_sub(policy.pending_pod_tolerance);
    score -= excess_pending as f64 * policy.pending_pod_penalty;

    let score = round2(score.clamp(MIN_SCORE, MAX_SCORE));
    let critical = score < policy.degraded_threshold;

    // Missing inputs never read as healthy, whatever the number says.
    let status = if snapshot.cpu_percent.is_none() || snapshot.memory_percent.is_none() {
        HealthStatus::Unknown
    } else if score >= policy.ready_threshold {
        HealthStatus::Ready
    } else {
        HealthStatus::Degraded
    };

    HealthScore {
        score,
        status,
        critical,
    }
}

/// Status for an average over many tenants, ignoring data completeness.
pub fn status_for_score(score: f64, policy: &HealthPolicy) -> HealthStatus {
    if score >= policy.ready_threshold {
        HealthStatus::Ready
    } else {
        HealthStatus::Degraded
    }
}

fn overage(percent: f64, threshold: f64) -> f64 {
    if percent.is_finite() && percent > threshold {
        percent - threshold
    } else {
        0.0
    }
}
