//! Folds a tenant's namespace workloads into a single [`WorkloadSnapshot`].

use tracing::warn;

use crate::collector::{NamespaceWorkload, PodPhase};
use crate::parsing::percent_of;
use crate::types::{ClusterCapacity, WorkloadSnapshot};

/// Pure aggregation; namespace order does not affect the result.
///
/// Percentages are only reported when `capacity` is known and every counted
/// container declares the matching limit.
pub fn calculate_snapshot(
    tenant: &str,
    workloads: &[NamespaceWorkload],
    capacity: Option<ClusterCapacity>,
) -> WorkloadSnapshot {
    let mut namespaces: Vec<String> = workloads.iter().map(|w| w.namespace.clone()).collect();
    namespaces.sort();

    let mut snapshot = WorkloadSnapshot {
        namespaces,
        cpu_limits_complete: true,
        memory_limits_complete: true,
        capacity,
        ..Default::default()
    };

    for workload in workloads {
        snapshot.service_count = snapshot.service_count.saturating_add(workload.service_count);
        snapshot.deployment_count = snapshot.deployment_count.saturating_add(workload.deployment_count);
        snapshot.statefulset_count = snapshot.statefulset_count.saturating_add(workload.statefulset_count);
        snapshot.config_map_count = snapshot.config_map_count.saturating_add(workload.config_map_count);
        snapshot.secret_count = snapshot.secret_count.saturating_add(workload.secret_count);

        for pod in &workload.pods {
            match pod.phase {
                PodPhase::Running => snapshot.pods.running += 1,
                PodPhase::Pending => snapshot.pods.pending += 1,
                PodPhase::Failed => snapshot.pods.failed += 1,
                PodPhase::Succeeded => snapshot.pods.succeeded += 1,
                // Unrecognised phases count as pending so they never look healthy
                PodPhase::Other(_) => snapshot.pods.pending += 1,
            }
            if pod.phase.is_terminal() {
                continue;
            }

            for c in &pod.containers {
                match (c.cpu_request, c.memory_request) {
                    (Some(_), Some(_)) => {}
                    _ => {
                        snapshot.containers_missing_requests += 1;
                        warn!(
                            tenant,
                            namespace = %workload.namespace,
                            pod = %pod.name,
                            container = %c.name,
                            "container without cpu/memory request counted as zero"
                        );
                    }
                }
                // Quantities up to 8E parse fine; their sums must not wrap.
                snapshot.cpu_requested_millicores = snapshot
                    .cpu_requested_millicores
                    .saturating_add(c.cpu_request.unwrap_or(0));
                snapshot.memory_requested_bytes = snapshot
                    .memory_requested_bytes
                    .saturating_add(c.memory_request.unwrap_or(0));

                match c.cpu_limit {
                    Some(limit) => snapshot.cpu_limit_millicores = snapshot.cpu_limit_millicores.saturating_add(limit),
                    None => snapshot.cpu_limits_complete = false,
                }
                match c.memory_limit {
                    Some(limit) => snapshot.memory_limit_bytes = snapshot.memory_limit_bytes.saturating_add(limit),
                    None => snapshot.memory_limits_complete = false,
                }
            }
        }
    }

    if let Some(cap) = capacity {
        if snapshot.cpu_limits_complete {
            snapshot.cpu_percent = percent_of(snapshot.cpu_requested_millicores, cap.cpu_millicores);
        }
        if snapshot.memory_limits_complete {
            snapshot.memory_percent = percent_of(snapshot.memory_requested_bytes, cap.memory_bytes);
        }
    }

    snapshot
}
