pub mod nodes;
pub mod pods;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Secret, Service};
use kube::{api::ListParams, Api, Client};
use tracing::warn;

use crate::error::Result;
use crate::types::ClusterCapacity;
pub use nodes::allocatable_capacity;
pub use pods::{ContainerResources, PodFootprint, PodPhase};

/// Everything the calculator needs from one namespace, already decoded.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NamespaceWorkload {
    pub namespace: String,
    pub pods: Vec<PodFootprint>,
    pub service_count: u32,
    pub deployment_count: u32,
    pub statefulset_count: u32,
    pub config_map_count: u32,
    pub secret_count: u32,
}

/// Read side of the cluster: per-namespace listings and node capacity.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn namespace_workload(&self, namespace: &str) -> Result<NamespaceWorkload>;

    /// Best effort; `None` when capacity cannot be determined.
    async fn allocatable(&self) -> Option<ClusterCapacity>;
}

/// Lists workloads straight from the API server.
#[derive(Clone)]
pub struct KubeClusterSource {
    client: Client,
}

impl KubeClusterSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterSource for KubeClusterSource {
    async fn namespace_workload(&self, namespace: &str) -> Result<NamespaceWorkload> {
        let lp = ListParams::default();
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        // Metadata only; secret payloads never leave the API server.
        let (pods, services, deployments, statefulsets, config_maps, secrets) = tokio::try_join!(
            pods.list(&lp),
            services.list_metadata(&lp),
            deployments.list_metadata(&lp),
            statefulsets.list_metadata(&lp),
            config_maps.list_metadata(&lp),
            secrets.list_metadata(&lp),
        )?;

        Ok(NamespaceWorkload {
            namespace: namespace.to_string(),
            pods: pods.items.iter().map(PodFootprint::from_pod).collect(),
            service_count: services.items.len() as u32,
            deployment_count: deployments.items.len() as u32,
            statefulset_count: statefulsets.items.len() as u32,
            config_map_count: config_maps.items.len() as u32,
            secret_count: secrets.items.len() as u32,
        })
    }

    async fn allocatable(&self) -> Option<ClusterCapacity> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        match nodes.list(&ListParams::default()).await {
            Ok(list) => allocatable_capacity(&list.items),
            Err(e) => {
                warn!(error = %e, "listing nodes failed; percentages will be absent");
                None
            }
        }
    }
}
