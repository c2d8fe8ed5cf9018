//! Create-or-update of `TenantInfo` records with optimistic concurrency.

use async_trait::async_trait;
use kube::api::ObjectMeta;
use tracing::{debug, info, warn};

use crate::crd::{record_labels, tenant_info_name, tenant_of_record, TenantInfo, TenantInfoSpec};
use crate::error::{Error, Result};

/// Persistence for published records. Implementations must reject a write whose
/// `resourceVersion` is stale with [`Error::Conflict`].
#[async_trait]
pub trait TenantInfoStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<TenantInfo>>;
    async fn create(&self, info: &TenantInfo) -> Result<TenantInfo>;
    async fn replace(&self, info: &TenantInfo) -> Result<TenantInfo>;
    /// Deleting an absent record succeeds.
    async fn delete(&self, name: &str) -> Result<()>;
    /// Records managed by this operator.
    async fn list(&self) -> Result<Vec<TenantInfo>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Created,
    Updated,
}

pub struct Publisher<S> {
    store: S,
    namespace: String,
    manager: String,
    max_attempts: u32,
}

impl<S: TenantInfoStore> Publisher<S> {
    pub fn new(store: S, namespace: impl Into<String>, manager: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            manager: manager.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write `spec` as the tenant's record. Each attempt re-reads the current
    /// record so the write carries a fresh version token; a conflict restarts the
    /// whole attempt.
    pub async fn publish(&self, spec: &TenantInfoSpec) -> Result<PublishOutcome> {
        let name = tenant_info_name(&spec.tenant);

        for attempt in 1..=self.max_attempts {
            let written = match self.store.get(&name).await? {
                None => {
                    let info = self.new_record(&name, spec);
                    self.store.create(&info).await.map(|_| PublishOutcome::Created)
                }
                Some(mut current) => {
                    current.spec = spec.clone();
                    current
                        .metadata
                        .labels
                        .get_or_insert_with(Default::default)
                        .extend(record_labels(&spec.tenant, &self.manager));
                    // Server-maintained; never sent back.
                    current.metadata.managed_fields = None;
                    self.store.replace(&current).await.map(|_| PublishOutcome::Updated)
                }
            };

            match written {
                Ok(outcome) => {
                    debug!(tenant = %spec.tenant, record = %name, ?outcome, attempt, "TenantInfo published");
                    return Ok(outcome);
                }
                Err(Error::Conflict { .. }) => {
                    warn!(tenant = %spec.tenant, record = %name, attempt, "TenantInfo write conflicted; retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::PublishExhausted {
            tenant: spec.tenant.clone(),
            attempts: self.max_attempts,
        })
    }

    /// Remove the record of a tenant that has no namespaces left. A record under
    /// that name that belongs to another tenant is left alone.
    pub async fn retire(&self, tenant: &str) -> Result<()> {
        let name = tenant_info_name(tenant);
        if let Some(current) = self.store.get(&name).await? {
            if let Some(owner) = tenant_of_record(&current).filter(|owner| owner != tenant) {
                warn!(tenant, record = %name, %owner, "record belongs to another tenant; not deleting");
                return Ok(());
            }
        }
        self.store.delete(&name).await?;
        info!(tenant, record = %name, "TenantInfo deleted");
        Ok(())
    }

    /// Tenants that currently have a record published by this operator.
    pub async fn published_tenants(&self) -> Result<Vec<String>> {
        let mut tenants: Vec<String> = self
            .store
            .list()
            .await?
            .iter()
            .filter_map(tenant_of_record)
            .collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }

    fn new_record(&self, name: &str, spec: &TenantInfoSpec) -> TenantInfo {
        TenantInfo {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(record_labels(&spec.tenant, &self.manager)),
                ..Default::default()
            },
            spec: spec.clone(),
        }
    }
}
