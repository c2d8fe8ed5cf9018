use k8s_openapi::api::core::v1::Node;
use tracing::warn;

use crate::parsing::{parse_cpu_to_millicores, parse_memory_to_bytes};
use crate::types::ClusterCapacity;

/// Sum allocatable CPU and memory over schedulable nodes.
///
/// Returns `None` when there is nothing to divide by: no schedulable node, or a
/// schedulable node whose allocatable figures are missing or unparseable.
pub fn allocatable_capacity(nodes: &[Node]) -> Option<ClusterCapacity> {
    let mut total = ClusterCapacity::default();
    let mut counted = 0usize;

    for node in nodes {
        let name = node.metadata.name.as_deref().unwrap_or("<unnamed>");
        let unschedulable = node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false);
        if unschedulable {
            continue;
        }

        let allocatable = node.status.as_ref().and_then(|s| s.allocatable.as_ref());
        let cpu = allocatable
            .and_then(|a| a.get("cpu"))
            .and_then(|q| parse_cpu_to_millicores(&q.0));
        let memory = allocatable
            .and_then(|a| a.get("memory"))
            .and_then(|q| parse_memory_to_bytes(&q.0));

        match (cpu, memory) {
            (Some(cpu), Some(memory)) => {
                total.cpu_millicores = total.cpu_millicores.saturating_add(cpu);
                total.memory_bytes = total.memory_bytes.saturating_add(memory);
                counted += 1;
            }
            _ => {
                warn!(node = name, "node allocatable capacity unavailable");
                return None;
            }
        }
    }

    if counted == 0 || total.cpu_millicores <= 0 || total.memory_bytes <= 0 {
        return None;
    }
    Some(total)
}
