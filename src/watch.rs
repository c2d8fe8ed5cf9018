//! Watch intake: turns namespace and workload change notifications into index
//! updates and dirty markings.

use std::fmt::Debug;
use std::future::Future;

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use kube::runtime::{metadata_watcher, watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, info, trace, warn};

use crate::index::SharedTenantIndex;
use crate::scheduler::SchedulerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Pod,
    Service,
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Pod => "Pod",
            WorkloadKind::Service => "Service",
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeEvent {
    /// Namespace added or updated; `tenant` is its current label value.
    Namespace { name: String, tenant: Option<String> },
    NamespaceDeleted { name: String },
    /// Full namespace listing after a watch (re)start.
    NamespacesRelisted(Vec<(String, Option<String>)>),
    Workload { kind: WorkloadKind, namespace: String },
    /// A workload watch (re)started; any tenant may have changed.
    WorkloadRelisted { kind: WorkloadKind },
}

fn namespace_tenant(ns: &Namespace, tenant_label: &str) -> Option<String> {
    ns.labels()
        .get(tenant_label)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Translate a namespace watch event. Objects without a name are skipped.
pub fn namespace_events(tenant_label: &str, event: watcher::Event<Namespace>) -> Vec<IntakeEvent> {
    match event {
        watcher::Event::Applied(ns) => match ns.metadata.name.clone() {
            Some(name) => vec![IntakeEvent::Namespace {
                tenant: namespace_tenant(&ns, tenant_label),
                name,
            }],
            None => {
                warn!("namespace event without a name; skipped");
                vec![]
            }
        },
        watcher::Event::Deleted(ns) => match ns.metadata.name {
            Some(name) => vec![IntakeEvent::NamespaceDeleted { name }],
            None => {
                warn!("namespace deletion without a name; skipped");
                vec![]
            }
        },
        watcher::Event::Restarted(all) => {
            let listing = all
                .iter()
                .filter_map(|ns| {
                    let name = ns.metadata.name.clone()?;
                    Some((name, namespace_tenant(ns, tenant_label)))
                })
                .collect();
            vec![IntakeEvent::NamespacesRelisted(listing)]
        }
    }
}

/// Translate a workload watch event. Cluster-scoped or unnamed-namespace objects are skipped.
pub fn workload_events<K: ResourceExt>(kind: WorkloadKind, event: watcher::Event<K>) -> Vec<IntakeEvent> {
    match event {
        watcher::Event::Applied(obj) | watcher::Event::Deleted(obj) => match obj.namespace() {
            Some(namespace) => vec![IntakeEvent::Workload { kind, namespace }],
            None => {
                warn!(kind = kind.as_str(), name = %obj.name_any(), "workload event without a namespace; skipped");
                vec![]
            }
        },
        watcher::Event::Restarted(_) => vec![IntakeEvent::WorkloadRelisted { kind }],
    }
}

/// Applies intake events to the tenant index and marks affected tenants dirty.
#[derive(Clone)]
pub struct Intake {
    index: SharedTenantIndex,
    scheduler: SchedulerHandle,
    tenant_label: String,
}

impl Intake {
    pub fn new(index: SharedTenantIndex, scheduler: SchedulerHandle, tenant_label: impl Into<String>) -> Self {
        Self {
            index,
            scheduler,
            tenant_label: tenant_label.into(),
        }
    }

    pub fn tenant_label(&self) -> &str {
        &self.tenant_label
    }

    pub async fn apply(&self, event: IntakeEvent) {
        match event {
            IntakeEvent::Namespace { name, tenant } => {
                let changed = self.index.write().await.on_namespace_event(&name, tenant.as_deref());
                self.scheduler.mark_all_dirty(changed).await;
            }
            IntakeEvent::NamespaceDeleted { name } => {
                let changed = self.index.write().await.on_namespace_event(&name, None);
                self.scheduler.mark_all_dirty(changed).await;
            }
            IntakeEvent::NamespacesRelisted(listing) => {
                let mut dirty = {
                    let mut index = self.index.write().await;
                    let changed = index.replace_all(listing);
                    let mut dirty = index.tenants();
                    dirty.extend(changed);
                    dirty
                };
                dirty.sort();
                dirty.dedup();
                info!(tenants = dirty.len(), "namespace watch relisted; resyncing all tenants");
                self.scheduler.mark_all_dirty(dirty).await;
            }
            IntakeEvent::Workload { kind, namespace } => {
                let tenant = { self.index.read().await.tenant_of(&namespace).map(str::to_string) };
                match tenant {
                    Some(tenant) => self.scheduler.mark_dirty(&tenant).await,
                    None => trace!(kind = kind.as_str(), %namespace, "workload outside any tenant"),
                }
            }
            IntakeEvent::WorkloadRelisted { kind } => {
                let tenants = { self.index.read().await.tenants() };
                debug!(kind = kind.as_str(), tenants = tenants.len(), "workload watch relisted");
                self.scheduler.mark_all_dirty(tenants).await;
            }
        }
    }

    /// Consume cluster watches until `shutdown` resolves.
    pub async fn run<F>(self, client: Client, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let label = self.tenant_label.clone();
        let namespaces = watcher(Api::<Namespace>::all(client.clone()), watcher::Config::default())
            .default_backoff()
            .map_ok(move |event| namespace_events(&label, event))
            .boxed();

        let mut events = stream::select_all(vec![
            namespaces,
            workload_stream(Api::<Pod>::all(client.clone()), WorkloadKind::Pod),
            workload_stream(Api::<Service>::all(client.clone()), WorkloadKind::Service),
            workload_stream(Api::<Deployment>::all(client.clone()), WorkloadKind::Deployment),
            workload_stream(Api::<StatefulSet>::all(client), WorkloadKind::StatefulSet),
        ]);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                next = events.next() => match next {
                    Some(Ok(batch)) => {
                        for event in batch {
                            self.apply(event).await;
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "watch stream error; backing off"),
                    None => break,
                },
            }
        }
        debug!("watch intake stopped");
    }
}

type IntakeStream = BoxStream<'static, Result<Vec<IntakeEvent>, watcher::Error>>;

// Only the namespace of a workload matters, so metadata is enough.
fn workload_stream<K>(api: Api<K>, kind: WorkloadKind) -> IntakeStream
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    metadata_watcher(api, watcher::Config::default())
        .default_backoff()
        .map_ok(move |event| workload_events(kind, event))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TenantIndex;
    use crate::scheduler::{Scheduler, SchedulerConfig, TenantState};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    const LABEL: &str = "capsule.clastix.io/tenant";

    fn namespace(name: &str, tenant: Option<&str>) -> Namespace {
        let labels = tenant.map(|t| BTreeMap::from([(LABEL.to_string(), t.to_string())]));
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pod_in(namespace: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web-0".to_string()),
                namespace: namespace.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn intake() -> (Intake, Scheduler) {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let intake = Intake::new(TenantIndex::shared(), scheduler.handle(), LABEL);
        (intake, scheduler)
    }

    #[test]
    fn test_namespace_event_translation() {
        let events = namespace_events(LABEL, watcher::Event::Applied(namespace("a1", Some("alpha"))));
        assert_eq!(
            events,
            vec![IntakeEvent::Namespace {
                name: "a1".to_string(),
                tenant: Some("alpha".to_string())
            }]
        );

        // Blank label value means no tenant
        let events = namespace_events(LABEL, watcher::Event::Applied(namespace("a1", Some("  "))));
        assert_eq!(
            events,
            vec![IntakeEvent::Namespace {
                name: "a1".to_string(),
                tenant: None
            }]
        );

        let nameless = Namespace::default();
        assert!(namespace_events(LABEL, watcher::Event::Applied(nameless)).is_empty());
    }

    #[test]
    fn test_workload_event_translation() {
        let events = workload_events(WorkloadKind::Pod, watcher::Event::Deleted(pod_in(Some("a1"))));
        assert_eq!(
            events,
            vec![IntakeEvent::Workload {
                kind: WorkloadKind::Pod,
                namespace: "a1".to_string()
            }]
        );
        assert!(workload_events(WorkloadKind::Pod, watcher::Event::Applied(pod_in(None))).is_empty());
        assert_eq!(
            workload_events::<Pod>(WorkloadKind::Service, watcher::Event::Restarted(vec![])),
            vec![IntakeEvent::WorkloadRelisted {
                kind: WorkloadKind::Service
            }]
        );
    }

    #[tokio::test]
    async fn test_labeling_namespace_marks_tenant_dirty() {
        let (intake, scheduler) = intake();
        let handle = scheduler.handle();

        intake
            .apply(IntakeEvent::Namespace {
                name: "a1".to_string(),
                tenant: Some("alpha".to_string()),
            })
            .await;

        assert_eq!(handle.state("alpha").await, TenantState::Dirty);
        assert_eq!(intake.index.read().await.members("alpha"), Some(vec!["a1".to_string()]));
    }

    #[tokio::test]
    async fn test_relabel_marks_old_and_new_tenant() {
        let (intake, scheduler) = intake();
        intake.index.write().await.on_namespace_event("a1", Some("alpha"));

        intake
            .apply(IntakeEvent::Namespace {
                name: "a1".to_string(),
                tenant: Some("beta".to_string()),
            })
            .await;

        let handle = scheduler.handle();
        assert_eq!(handle.state("alpha").await, TenantState::Dirty);
        assert_eq!(handle.state("beta").await, TenantState::Dirty);
    }

    #[tokio::test]
    async fn test_workload_outside_tenants_is_ignored() {
        let (intake, scheduler) = intake();
        intake.index.write().await.on_namespace_event("a1", Some("alpha"));

        intake
            .apply(IntakeEvent::Workload {
                kind: WorkloadKind::Pod,
                namespace: "kube-system".to_string(),
            })
            .await;
        assert_eq!(scheduler.handle().state("alpha").await, TenantState::Idle);

        intake
            .apply(IntakeEvent::Workload {
                kind: WorkloadKind::Deployment,
                namespace: "a1".to_string(),
            })
            .await;
        assert_eq!(scheduler.handle().state("alpha").await, TenantState::Dirty);
    }

    #[tokio::test]
    async fn test_relist_resyncs_live_and_vanished_tenants() {
        let (intake, scheduler) = intake();
        {
            let mut index = intake.index.write().await;
            index.on_namespace_event("a1", Some("alpha"));
            index.on_namespace_event("g1", Some("gamma"));
        }

        // gamma's namespace vanished while the watch was down
        intake
            .apply(IntakeEvent::NamespacesRelisted(vec![
                ("a1".to_string(), Some("alpha".to_string())),
                ("b1".to_string(), Some("beta".to_string())),
            ]))
            .await;

        let handle = scheduler.handle();
        for tenant in ["alpha", "beta", "gamma"] {
            assert_eq!(handle.state(tenant).await, TenantState::Dirty, "{}", tenant);
        }
        assert!(!intake.index.read().await.contains_tenant("gamma"));
        assert!(intake.index.read().await.is_synced());
    }

    #[tokio::test]
    async fn test_workload_relist_marks_every_tenant() {
        let (intake, scheduler) = intake();
        {
            let mut index = intake.index.write().await;
            index.on_namespace_event("a1", Some("alpha"));
            index.on_namespace_event("b1", Some("beta"));
        }

        intake
            .apply(IntakeEvent::WorkloadRelisted {
                kind: WorkloadKind::StatefulSet,
            })
            .await;

        let handle = scheduler.handle();
        assert_eq!(handle.state("alpha").await, TenantState::Dirty);
        assert_eq!(handle.state("beta").await, TenantState::Dirty);
    }
}
