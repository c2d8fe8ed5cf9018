use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::parsing::{format_cpu, format_memory};
use crate::types::{HealthScore, HealthStatus, WorkloadSnapshot};

pub const TENANT_LABEL_KEY: &str = "tenant-observer.io/tenant";
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";

/// Published per-tenant rollup, one object per live tenant in the operator's namespace.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "operators.clastix.io",
    version = "v1",
    kind = "TenantInfo",
    plural = "tenantinfos",
    shortname = "ti",
    namespaced,
    printcolumn = r#"{"name":"Tenant","type":"string","jsonPath":".spec.tenant"}"#,
    printcolumn = r#"{"name":"Namespaces","type":"integer","jsonPath":".spec.namespaceCount"}"#,
    printcolumn = r#"{"name":"CPU%","type":"number","jsonPath":".spec.cpuPercent"}"#,
    printcolumn = r#"{"name":"Mem%","type":"number","jsonPath":".spec.memPercent"}"#,
    printcolumn = r#"{"name":"Score","type":"number","jsonPath":".spec.healthScore"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".spec.status"}"#,
    printcolumn = r#"{"name":"Reconciled","type":"date","jsonPath":".spec.lastReconciled"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfoSpec {
    pub tenant: String,
    pub namespaces: Vec<String>,
    pub namespace_count: u32,
    /// Millicores.
    pub cpu_requested: i64,
    pub cpu_limit: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    pub cpu_display: String,
    /// Bytes.
    pub mem_requested: i64,
    pub mem_limit: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_percent: Option<f64>,
    pub mem_display: String,
    pub pods_running: u32,
    pub pods_pending: u32,
    pub pods_failed: u32,
    pub pods_succeeded: u32,
    pub service_count: u32,
    pub deployment_count: u32,
    pub stateful_set_count: u32,
    #[serde(default)]
    pub config_map_count: u32,
    #[serde(default)]
    pub secret_count: u32,
    pub health_score: f64,
    pub status: HealthStatus,
    pub critical: bool,
    /// RFC 3339.
    pub last_reconciled: String,
}

impl TenantInfoSpec {
    pub fn from_parts(
        tenant: &str,
        snapshot: &WorkloadSnapshot,
        health: &HealthScore,
        reconciled_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            tenant: tenant.to_string(),
            namespaces: snapshot.namespaces.clone(),
            namespace_count: snapshot.namespaces.len() as u32,
            cpu_requested: snapshot.cpu_requested_millicores,
            cpu_limit: snapshot.cpu_limit_millicores,
            cpu_percent: snapshot.cpu_percent,
            cpu_display: format_cpu(snapshot.cpu_requested_millicores),
            mem_requested: snapshot.memory_requested_bytes,
            mem_limit: snapshot.memory_limit_bytes,
            mem_percent: snapshot.memory_percent,
            mem_display: format_memory(snapshot.memory_requested_bytes),
            pods_running: snapshot.pods.running,
            pods_pending: snapshot.pods.pending,
            pods_failed: snapshot.pods.failed,
            pods_succeeded: snapshot.pods.succeeded,
            service_count: snapshot.service_count,
            deployment_count: snapshot.deployment_count,
            stateful_set_count: snapshot.statefulset_count,
            config_map_count: snapshot.config_map_count,
            secret_count: snapshot.secret_count,
            health_score: health.score,
            status: health.status,
            critical: health.critical,
            last_reconciled: reconciled_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }

    pub fn pods_total(&self) -> u32 {
        self.pods_running
            .saturating_add(self.pods_pending)
            .saturating_add(self.pods_failed)
            .saturating_add(self.pods_succeeded)
    }
}

/// Object name for a tenant's record: `<tenant>-info`, made DNS-safe.
///
/// When cleaning alters the tenant (case, `_`, `.`), a hash of the raw value is
/// appended so that `team.a` and `team-a` never share a record.
pub fn tenant_info_name(tenant: &str) -> String {
    let sanitized: String = tenant
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let prefix = sanitized.trim_matches('-');
    if prefix == tenant {
        return format!("{}-info", prefix);
    }
    let hash = fnv1a(tenant.as_bytes());
    if prefix.is_empty() {
        format!("t-{:08x}-info", hash)
    } else {
        format!("{}-{:08x}-info", prefix, hash)
    }
}

/// 32-bit FNV-1a; stable across builds and platforms.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ u32::from(*b)).wrapping_mul(0x0100_0193))
}

pub fn record_labels(tenant: &str, manager: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TENANT_LABEL_KEY.to_string(), tenant.to_string()),
        (MANAGED_BY_LABEL_KEY.to_string(), manager.to_string()),
    ])
}

/// The tenant a record belongs to, preferring the spec over the label.
pub fn tenant_of_record(info: &TenantInfo) -> Option<String> {
    if !info.spec.tenant.is_empty() {
        return Some(info.spec.tenant.clone());
    }
    info.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(TENANT_LABEL_KEY))
        .cloned()
}
