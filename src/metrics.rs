//! Prometheus gauges for published tenant rollups and cluster totals.

use prometheus::{Encoder, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::crd::TenantInfoSpec;
use crate::report::ClusterSummary;
use crate::types::HealthStatus;

const PREFIX: &str = "tenant_observer";
const POD_STATES: &[&str] = &["total", "running", "pending", "failed", "succeeded"];
const STATUSES: &[HealthStatus] = &[HealthStatus::Ready, HealthStatus::Degraded, HealthStatus::Unknown];

/// Handle to the operator's registry; clones share the same gauges.
#[derive(Clone)]
pub struct TenantMetrics {
    registry: Registry,
    namespaces: IntGaugeVec,
    cpu_requested: IntGaugeVec,
    cpu_limit: IntGaugeVec,
    memory_requested: IntGaugeVec,
    memory_limit: IntGaugeVec,
    cpu_percent: GaugeVec,
    memory_percent: GaugeVec,
    pods: IntGaugeVec,
    services: IntGaugeVec,
    config_maps: IntGaugeVec,
    secrets: IntGaugeVec,
    health_score: GaugeVec,
    total_tenants: IntGauge,
    total_namespaces: IntGauge,
    total_cpu_requested: IntGauge,
    total_memory_requested: IntGauge,
    total_pods: IntGauge,
    cluster_health: GaugeVec,
}

fn int_gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> prometheus::Result<IntGaugeVec> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> prometheus::Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl TenantMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some(PREFIX.to_string()), None)?;
        let r = &registry;
        let tenant = &["tenant"];

        Ok(Self {
            namespaces: int_gauge_vec(r, "namespace_count", "Namespaces labeled for the tenant", tenant)?,
            cpu_requested: int_gauge_vec(r, "cpu_requested_millicores", "CPU requested by live pods", tenant)?,
            cpu_limit: int_gauge_vec(r, "cpu_limit_millicores", "CPU limits declared by live pods", tenant)?,
            memory_requested: int_gauge_vec(r, "memory_requested_bytes", "Memory requested by live pods", tenant)?,
            memory_limit: int_gauge_vec(r, "memory_limit_bytes", "Memory limits declared by live pods", tenant)?,
            cpu_percent: gauge_vec(r, "cpu_request_percent", "CPU requested as a share of allocatable", tenant)?,
            memory_percent: gauge_vec(
                r,
                "memory_request_percent",
                "Memory requested as a share of allocatable",
                tenant,
            )?,
            pods: int_gauge_vec(r, "pods", "Pods by phase bucket", &["tenant", "state"])?,
            services: int_gauge_vec(r, "services", "Services in the tenant's namespaces", tenant)?,
            config_maps: int_gauge_vec(r, "configmaps", "ConfigMaps in the tenant's namespaces", tenant)?,
            secrets: int_gauge_vec(r, "secrets", "Secrets in the tenant's namespaces", tenant)?,
            health_score: gauge_vec(r, "health_score", "Tenant health score (0-100)", &["tenant", "status"])?,
            total_tenants: int_gauge(r, "total_tenants", "Tenants with a published record")?,
            total_namespaces: int_gauge(r, "total_namespaces", "Namespaces across all tenants")?,
            total_cpu_requested: int_gauge(r, "total_cpu_requested_millicores", "CPU requested across all tenants")?,
            total_memory_requested: int_gauge(
                r,
                "total_memory_requested_bytes",
                "Memory requested across all tenants",
            )?,
            total_pods: int_gauge(r, "total_pods", "Pods across all tenants")?,
            cluster_health: gauge_vec(r, "cluster_health_score", "Mean tenant health score", &["status"])?,
            registry,
        })
    }

    /// Set every per-tenant gauge from a freshly published record.
    pub fn observe(&self, spec: &TenantInfoSpec) {
        let t = spec.tenant.as_str();
        self.namespaces.with_label_values(&[t]).set(i64::from(spec.namespace_count));
        self.cpu_requested.with_label_values(&[t]).set(spec.cpu_requested);
        self.cpu_limit.with_label_values(&[t]).set(spec.cpu_limit);
        self.memory_requested.with_label_values(&[t]).set(spec.mem_requested);
        self.memory_limit.with_label_values(&[t]).set(spec.mem_limit);
        set_or_clear(&self.cpu_percent, t, spec.cpu_percent);
        set_or_clear(&self.memory_percent, t, spec.mem_percent);

        let counts = [
            spec.pods_total(),
            spec.pods_running,
            spec.pods_pending,
            spec.pods_failed,
            spec.pods_succeeded,
        ];
        for (state, count) in POD_STATES.iter().zip(counts) {
            self.pods.with_label_values(&[t, *state]).set(i64::from(count));
        }
        self.services.with_label_values(&[t]).set(i64::from(spec.service_count));
        self.config_maps.with_label_values(&[t]).set(i64::from(spec.config_map_count));
        self.secrets.with_label_values(&[t]).set(i64::from(spec.secret_count));

        // One series per tenant, labeled with its current status
        for status in STATUSES {
            if *status != spec.status {
                let _ = self.health_score.remove_label_values(&[t, status.as_str()]);
            }
        }
        self.health_score
            .with_label_values(&[t, spec.status.as_str()])
            .set(spec.health_score);
    }

    /// Drop every series of a tenant whose record was retired.
    pub fn forget(&self, tenant: &str) {
        for vec in [
            &self.namespaces,
            &self.cpu_requested,
            &self.cpu_limit,
            &self.memory_requested,
            &self.memory_limit,
            &self.services,
            &self.config_maps,
            &self.secrets,
        ] {
            let _ = vec.remove_label_values(&[tenant]);
        }
        let _ = self.cpu_percent.remove_label_values(&[tenant]);
        let _ = self.memory_percent.remove_label_values(&[tenant]);
        for state in POD_STATES {
            let _ = self.pods.remove_label_values(&[tenant, *state]);
        }
        for status in STATUSES {
            let _ = self.health_score.remove_label_values(&[tenant, status.as_str()]);
        }
    }

    pub fn observe_cluster(&self, summary: &ClusterSummary) {
        self.total_tenants
            .set(i64::try_from(summary.tenant_count).unwrap_or(i64::MAX));
        self.total_namespaces.set(i64::from(summary.namespace_count));
        self.total_cpu_requested.set(summary.cpu_requested);
        self.total_memory_requested.set(summary.mem_requested);
        self.total_pods.set(i64::from(summary.pods_total));

        self.cluster_health.reset();
        if let Some(average) = summary.average_health_score {
            self.cluster_health
                .with_label_values(&[summary.status.as_str()])
                .set(average);
        }
    }

    /// Text exposition format.
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn set_or_clear(vec: &GaugeVec, tenant: &str, value: Option<f64>) {
    match value {
        Some(v) => vec.with_label_values(&[tenant]).set(v),
        None => {
            let _ = vec.remove_label_values(&[tenant]);
        }
    }
}
