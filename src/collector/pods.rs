use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use tracing::warn;

use crate::parsing::{parse_cpu_to_millicores, parse_memory_to_bytes};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodPhase {
    Running,
    Pending,
    Succeeded,
    Failed,
    /// Anything the API reported that is not one of the above, or no phase at all.
    Other(Option<String>),
}

impl PodPhase {
    pub fn from_status(phase: Option<&str>) -> Self {
        match phase {
            Some("Running") => PodPhase::Running,
            Some("Pending") => PodPhase::Pending,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            other => PodPhase::Other(other.map(str::to_string)),
        }
    }

    /// Terminal pods no longer hold node resources.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

/// Requests and limits of one container. `None` means the field was not declared
/// (or could not be parsed), which is distinct from an explicit zero.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ContainerResources {
    pub name: String,
    pub cpu_request: Option<i64>,
    pub cpu_limit: Option<i64>,
    pub memory_request: Option<i64>,
    pub memory_limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodFootprint {
    pub name: String,
    pub phase: PodPhase,
    pub containers: Vec<ContainerResources>,
}

impl PodFootprint {
    pub fn from_pod(pod: &Pod) -> Self {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let phase = PodPhase::from_status(pod.status.as_ref().and_then(|s| s.phase.as_deref()));
        let containers = pod
            .spec
            .as_ref()
            .map(|spec| {
                spec.containers
                    .iter()
                    .map(|c| container_resources(&name, c))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name,
            phase,
            containers,
        }
    }
}

fn container_resources(pod: &str, container: &Container) -> ContainerResources {
    let resources = container.resources.as_ref();
    let requests = resources.and_then(|r| r.requests.as_ref());
    let limits = resources.and_then(|r| r.limits.as_ref());
    let quantity = |map: Option<&BTreeMap<String, Quantity>>, key: &str, parse: fn(&str) -> Option<i64>| {
        let raw = map.and_then(|m| m.get(key))?;
        let parsed = parse(&raw.0);
        if parsed.is_none() {
            warn!(pod, container = %container.name, key, value = %raw.0, "unparseable resource quantity treated as absent");
        }
        parsed
    };

    ContainerResources {
        name: container.name.clone(),
        cpu_request: quantity(requests, "cpu", parse_cpu_to_millicores),
        cpu_limit: quantity(limits, "cpu", parse_cpu_to_millicores),
        memory_request: quantity(requests, "memory", parse_memory_to_bytes),
        memory_limit: quantity(limits, "memory", parse_memory_to_bytes),
    }
}
