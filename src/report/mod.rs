use serde::Serialize;

use crate::crd::TenantInfoSpec;
use crate::health::{status_for_score, HealthPolicy};
use crate::parsing::{format_cpu, format_memory, round2};
use crate::types::HealthStatus;

/// Cluster-wide rollup over the last published tenant records
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub tenant_count: usize,
    pub namespace_count: u32,
    pub cpu_requested: i64,
    pub cpu_display: String,
    pub mem_requested: i64,
    pub mem_display: String,
    pub pods_total: u32,
    pub pods_running: u32,
    pub pods_pending: u32,
    pub pods_failed: u32,
    /// Mean of the tenants' scores; absent when there are no tenants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_health_score: Option<f64>,
    pub status: HealthStatus,
    /// Tenants flagged critical, sorted.
    pub critical_tenants: Vec<String>,
    /// Tenants whose status is not `Ready`, sorted.
    pub unhealthy_tenants: Vec<String>,
}

impl ClusterSummary {
    pub fn from_records<'a, I>(records: I, policy: &HealthPolicy) -> Self
    where
        I: IntoIterator<Item = &'a TenantInfoSpec>,
    {
        let mut summary = ClusterSummary {
            tenant_count: 0,
            namespace_count: 0,
            cpu_requested: 0,
            cpu_display: String::new(),
            mem_requested: 0,
            mem_display: String::new(),
            pods_total: 0,
            pods_running: 0,
            pods_pending: 0,
            pods_failed: 0,
            average_health_score: None,
            status: HealthStatus::Unknown,
            critical_tenants: Vec::new(),
            unhealthy_tenants: Vec::new(),
        };
        let mut score_sum = 0.0;

        for r in records {
            summary.tenant_count += 1;
            summary.namespace_count = summary.namespace_count.saturating_add(r.namespace_count);
            summary.cpu_requested = summary.cpu_requested.saturating_add(r.cpu_requested);
            summary.mem_requested = summary.mem_requested.saturating_add(r.mem_requested);
            summary.pods_total = summary.pods_total.saturating_add(r.pods_total());
            summary.pods_running = summary.pods_running.saturating_add(r.pods_running);
            summary.pods_pending = summary.pods_pending.saturating_add(r.pods_pending);
            summary.pods_failed = summary.pods_failed.saturating_add(r.pods_failed);
            score_sum += r.health_score;
            if r.critical {
                summary.critical_tenants.push(r.tenant.clone());
            }
            if r.status != HealthStatus::Ready {
                summary.unhealthy_tenants.push(r.tenant.clone());
            }
        }

        if summary.tenant_count > 0 {
            let average = round2(score_sum / summary.tenant_count as f64);
            summary.average_health_score = Some(average);
            summary.status = status_for_score(average, policy);
        }
        summary.cpu_display = format_cpu(summary.cpu_requested);
        summary.mem_display = format_memory(summary.mem_requested);
        summary.critical_tenants.sort();
        summary.unhealthy_tenants.sort();
        summary
    }

    pub fn has_issues(&self) -> bool {
        !self.unhealthy_tenants.is_empty()
    }
}
