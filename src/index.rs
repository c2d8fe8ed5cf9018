//! Tenant membership, kept current from the namespace watch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

/// Shared between event intake (single writer) and reconciliation workers (readers).
pub type SharedTenantIndex = Arc<RwLock<TenantIndex>>;

#[derive(Debug, Default)]
pub struct TenantIndex {
    tenant_of: HashMap<String, String>,
    members: BTreeMap<String, BTreeSet<String>>,
    synced: bool,
}

impl TenantIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTenantIndex {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Apply one namespace observation. `tenant` is the label value, `None` when the
    /// label is gone or the namespace was deleted. Returns the tenants whose
    /// membership changed: none, one, or the old and new tenant of a relabel.
    pub fn on_namespace_event(&mut self, namespace: &str, tenant: Option<&str>) -> Vec<String> {
        let tenant = tenant.filter(|t| !t.is_empty());
        let previous = self.tenant_of.get(namespace).cloned();

        if previous.as_deref() == tenant {
            return Vec::new();
        }

        let mut changed = Vec::with_capacity(2);
        if let Some(old) = previous {
            self.remove_member(&old, namespace);
            changed.push(old);
        }
        if let Some(new) = tenant {
            self.tenant_of.insert(namespace.to_string(), new.to_string());
            self.members
                .entry(new.to_string())
                .or_default()
                .insert(namespace.to_string());
            changed.push(new.to_string());
        }
        debug!(namespace, ?changed, "tenant membership changed");
        changed
    }

    /// Replace the whole membership with a fresh namespace listing, as after a watch
    /// relist. Returns every tenant whose membership differs from before.
    ///
    /// The first call marks the index synced.
    pub fn replace_all<I>(&mut self, observed: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let observed: HashMap<String, Option<String>> = observed.into_iter().collect();
        let mut changed = BTreeSet::new();

        let gone: Vec<String> = self
            .tenant_of
            .keys()
            .filter(|ns| !observed.contains_key(*ns))
            .cloned()
            .collect();
        for ns in gone {
            changed.extend(self.on_namespace_event(&ns, None));
        }
        for (ns, tenant) in &observed {
            changed.extend(self.on_namespace_event(ns, tenant.as_deref()));
        }
        self.synced = true;
        changed
    }

    /// Whether a complete namespace listing has been applied. Until then an absent
    /// tenant may simply not have been listed yet.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Sorted member namespaces, `None` if the tenant has no members.
    pub fn members(&self, tenant: &str) -> Option<Vec<String>> {
        self.members
            .get(tenant)
            .filter(|m| !m.is_empty())
            .map(|m| m.iter().cloned().collect())
    }

    pub fn tenant_of(&self, namespace: &str) -> Option<&str> {
        self.tenant_of.get(namespace).map(String::as_str)
    }

    pub fn tenants(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn contains_tenant(&self, tenant: &str) -> bool {
        self.members.contains_key(tenant)
    }

    pub fn namespace_count(&self) -> usize {
        self.tenant_of.len()
    }

    fn remove_member(&mut self, tenant: &str, namespace: &str) {
        self.tenant_of.remove(namespace);
        if let Some(set) = self.members.get_mut(tenant) {
            set.remove(namespace);
            if set.is_empty() {
                self.members.remove(tenant);
            }
        }
    }
}
