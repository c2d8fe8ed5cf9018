//! In-memory fakes for the cluster and the record store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::collector::{ClusterSource, NamespaceWorkload};
use crate::crd::{TenantInfo, TenantInfoSpec};
use crate::error::{Error, Result};
use crate::publisher::TenantInfoStore;
use crate::types::{ClusterCapacity, HealthStatus};

pub fn sample_spec(tenant: &str) -> TenantInfoSpec {
    TenantInfoSpec {
        tenant: tenant.to_string(),
        namespaces: vec![format!("{}-a", tenant)],
        namespace_count: 1,
        cpu_requested: 500,
        cpu_limit: 1000,
        cpu_percent: Some(12.5),
        cpu_display: "500m".to_string(),
        mem_requested: 1024 * 1024 * 1024,
        mem_limit: 2 * 1024 * 1024 * 1024,
        mem_percent: Some(12.5),
        mem_display: "1.00 Gi".to_string(),
        pods_running: 3,
        pods_pending: 0,
        pods_failed: 0,
        pods_succeeded: 0,
        service_count: 1,
        deployment_count: 1,
        stateful_set_count: 0,
        config_map_count: 2,
        secret_count: 1,
        health_score: 100.0,
        status: HealthStatus::Ready,
        critical: false,
        last_reconciled: "2026-01-01T00:00:00Z".to_string(),
    }
}

#[derive(Default)]
struct StoreState {
    records: BTreeMap<String, TenantInfo>,
    version: u64,
    conflicts_to_inject: u32,
    bump_after_get: HashSet<String>,
    write_attempts: u32,
}

/// Record store that enforces `resourceVersion` like the API server does.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn record(&self, name: &str) -> Option<TenantInfo> {
        self.state.lock().unwrap().records.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().unwrap().records.keys().cloned().collect()
    }

    pub fn write_attempts(&self) -> u32 {
        self.state.lock().unwrap().write_attempts
    }

    pub fn fail_next_writes_with_conflict(&self, n: u32) {
        self.state.lock().unwrap().conflicts_to_inject = n;
    }

    /// Simulate another writer touching the record right after our next read of it.
    pub fn bump_version_after_next_get(&self, name: &str) {
        self.state.lock().unwrap().bump_after_get.insert(name.to_string());
    }

    pub fn insert(&self, mut info: TenantInfo) {
        let mut state = self.state.lock().unwrap();
        state.version += 1;
        info.metadata.resource_version = Some(state.version.to_string());
        let name = info.metadata.name.clone().unwrap();
        state.records.insert(name, info);
    }
}

fn conflict(name: &str) -> Error {
    Error::Conflict {
        name: name.to_string(),
    }
}

#[async_trait]
impl TenantInfoStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<TenantInfo>> {
        let mut state = self.state.lock().unwrap();
        let found = state.records.get(name).cloned();
        if found.is_some() && state.bump_after_get.remove(name) {
            state.version += 1;
            let v = state.version.to_string();
            if let Some(r) = state.records.get_mut(name) {
                r.metadata.resource_version = Some(v);
            }
        }
        Ok(found)
    }

    async fn create(&self, info: &TenantInfo) -> Result<TenantInfo> {
        let mut state = self.state.lock().unwrap();
        state.write_attempts += 1;
        let name = info.metadata.name.clone().unwrap_or_default();
        if state.conflicts_to_inject > 0 {
            state.conflicts_to_inject -= 1;
            return Err(conflict(&name));
        }
        if state.records.contains_key(&name) {
            return Err(conflict(&name));
        }
        state.version += 1;
        let mut stored = info.clone();
        stored.metadata.resource_version = Some(state.version.to_string());
        state.records.insert(name, stored.clone());
        Ok(stored)
    }

    async fn replace(&self, info: &TenantInfo) -> Result<TenantInfo> {
        let mut state = self.state.lock().unwrap();
        state.write_attempts += 1;
        let name = info.metadata.name.clone().unwrap_or_default();
        if state.conflicts_to_inject > 0 {
            state.conflicts_to_inject -= 1;
            return Err(conflict(&name));
        }
        let current_version = state
            .records
            .get(&name)
            .and_then(|r| r.metadata.resource_version.clone());
        if current_version.is_none() || current_version != info.metadata.resource_version {
            return Err(conflict(&name));
        }
        state.version += 1;
        let mut stored = info.clone();
        stored.metadata.resource_version = Some(state.version.to_string());
        state.records.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.state.lock().unwrap().records.remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TenantInfo>> {
        Ok(self.state.lock().unwrap().records.values().cloned().collect())
    }
}

#[derive(Default)]
struct ClusterState {
    workloads: HashMap<String, NamespaceWorkload>,
    capacity: Option<ClusterCapacity>,
    failing: HashSet<String>,
}

/// Cluster whose namespaces and capacity are set directly by the test.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    pub fn set_workload(&self, workload: NamespaceWorkload) {
        self.state
            .lock()
            .unwrap()
            .workloads
            .insert(workload.namespace.clone(), workload);
    }

    pub fn set_capacity(&self, capacity: Option<ClusterCapacity>) {
        self.state.lock().unwrap().capacity = capacity;
    }

    pub fn fail_namespace(&self, namespace: &str, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing.insert(namespace.to_string());
        } else {
            state.failing.remove(namespace);
        }
    }
}

#[async_trait]
impl ClusterSource for FakeCluster {
    async fn namespace_workload(&self, namespace: &str) -> Result<NamespaceWorkload> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(namespace) {
            return Err(Error::InvalidResource(format!("listing {} failed", namespace)));
        }
        Ok(state.workloads.get(namespace).cloned().unwrap_or_else(|| NamespaceWorkload {
            namespace: namespace.to_string(),
            ..Default::default()
        }))
    }

    async fn allocatable(&self) -> Option<ClusterCapacity> {
        self.state.lock().unwrap().capacity
    }
}
