//! One reconciliation pass: membership snapshot, collect, calculate, score, publish.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::calculator::calculate_snapshot;
use crate::collector::ClusterSource;
use crate::crd::TenantInfoSpec;
use crate::error::{Error, Result};
use crate::health::{score_snapshot, HealthPolicy};
use crate::index::SharedTenantIndex;
use crate::kubernetes::EventRecorder;
use crate::metrics::TenantMetrics;
use crate::publisher::{Publisher, TenantInfoStore};
use crate::report::ClusterSummary;
use crate::scheduler::Reconciler;

/// Last successfully published spec per tenant, for the HTTP surface.
pub type TenantCatalog = Arc<RwLock<BTreeMap<String, TenantInfoSpec>>>;

pub struct TenantEngine<C, S> {
    index: SharedTenantIndex,
    cluster: C,
    publisher: Publisher<S>,
    policy: HealthPolicy,
    catalog: TenantCatalog,
    events: Option<EventRecorder>,
    metrics: Option<TenantMetrics>,
}

impl<C, S> TenantEngine<C, S>
where
    C: ClusterSource,
    S: TenantInfoStore,
{
    pub fn new(index: SharedTenantIndex, cluster: C, publisher: Publisher<S>, policy: HealthPolicy) -> Self {
        Self {
            index,
            cluster,
            publisher,
            policy,
            catalog: Arc::new(RwLock::new(BTreeMap::new())),
            events: None,
            metrics: None,
        }
    }

    pub fn with_events(mut self, events: EventRecorder) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_metrics(mut self, metrics: TenantMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn catalog(&self) -> TenantCatalog {
        self.catalog.clone()
    }

    pub fn publisher(&self) -> &Publisher<S> {
        &self.publisher
    }

    /// Tenants with a published record but no members in the index.
    pub async fn orphaned_tenants(&self) -> Result<Vec<String>> {
        let published = self.publisher.published_tenants().await?;
        let index = self.index.read().await;
        Ok(published
            .into_iter()
            .filter(|t| !index.contains_tenant(t))
            .collect())
    }

    fn refresh_totals(&self, catalog: &BTreeMap<String, TenantInfoSpec>) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_cluster(&ClusterSummary::from_records(catalog.values(), &self.policy));
        }
    }

    async fn compute(&self, tenant: &str, members: &[String]) -> Result<TenantInfoSpec> {
        let mut workloads = Vec::with_capacity(members.len());
        for namespace in members {
            workloads.push(self.cluster.namespace_workload(namespace).await?);
        }
        let capacity = self.cluster.allocatable().await;

        let snapshot = calculate_snapshot(tenant, &workloads, capacity);
        let health = score_snapshot(&snapshot, &self.policy);
        debug!(
            tenant,
            cpu_millicores = snapshot.cpu_requested_millicores,
            memory_bytes = snapshot.memory_requested_bytes,
            pods = snapshot.pods.total(),
            score = health.score,
            status = %health.status,
            "tenant snapshot computed"
        );
        Ok(TenantInfoSpec::from_parts(tenant, &snapshot, &health, Utc::now()))
    }
}

#[async_trait]
impl<C, S> Reconciler for TenantEngine<C, S>
where
    C: ClusterSource + 'static,
    S: TenantInfoStore + 'static,
{
    async fn reconcile(&self, tenant: &str) -> Result<()> {
        // Copy membership out and release the lock before any I/O.
        let members = { self.index.read().await.members(tenant) };

        let Some(members) = members else {
            self.publisher.retire(tenant).await?;
            let mut catalog = self.catalog.write().await;
            catalog.remove(tenant);
            if let Some(metrics) = &self.metrics {
                metrics.forget(tenant);
            }
            self.refresh_totals(&catalog);
            return Ok(());
        };

        let spec = self.compute(tenant, &members).await?;
        let outcome = self.publisher.publish(&spec).await?;
        info!(
            tenant,
            namespaces = spec.namespace_count,
            score = spec.health_score,
            status = %spec.status,
            ?outcome,
            "tenant reconciled"
        );
        let mut catalog = self.catalog.write().await;
        if let Some(metrics) = &self.metrics {
            metrics.observe(&spec);
        }
        catalog.insert(tenant.to_string(), spec);
        self.refresh_totals(&catalog);
        Ok(())
    }

    async fn report_failure(&self, tenant: &str, consecutive_failures: u32, error: &Error) {
        error!(tenant, consecutive_failures, error = %error, "tenant keeps failing to reconcile");
        if let Some(events) = &self.events {
            events.reconcile_failed(tenant, consecutive_failures, error).await;
        }
    }
}
