use async_trait::async_trait;
use http::StatusCode;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource};
use tracing::warn;

use crate::crd::{tenant_info_name, TenantInfo, MANAGED_BY_LABEL_KEY};
use crate::error::{Error, Result};
use crate::publisher::TenantInfoStore;

pub fn api_error_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(resp) => Some(resp.code),
        _ => None,
    }
}

pub fn is_conflict(err: &kube::Error) -> bool {
    api_error_code(err) == Some(StatusCode::CONFLICT.as_u16())
}

pub fn is_not_found(err: &kube::Error) -> bool {
    api_error_code(err) == Some(StatusCode::NOT_FOUND.as_u16())
}

fn classify(name: &str, err: kube::Error) -> Error {
    if is_conflict(&err) {
        Error::Conflict {
            name: name.to_string(),
        }
    } else {
        Error::Kube(err)
    }
}

/// `TenantInfo` objects in the operator's home namespace.
#[derive(Clone)]
pub struct KubeTenantInfoStore {
    api: Api<TenantInfo>,
    manager: String,
}

impl KubeTenantInfoStore {
    pub fn new(client: Client, namespace: &str, manager: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            manager: manager.to_string(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.manager.clone()),
            ..Default::default()
        }
    }
}

fn object_name(info: &TenantInfo) -> Result<&str> {
    info.metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::InvalidResource("TenantInfo without metadata.name".to_string()))
}

#[async_trait]
impl TenantInfoStore for KubeTenantInfoStore {
    async fn get(&self, name: &str) -> Result<Option<TenantInfo>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create(&self, info: &TenantInfo) -> Result<TenantInfo> {
        let name = object_name(info)?;
        self.api
            .create(&self.post_params(), info)
            .await
            .map_err(|e| classify(name, e))
    }

    async fn replace(&self, info: &TenantInfo) -> Result<TenantInfo> {
        let name = object_name(info)?;
        self.api
            .replace(name, &self.post_params(), info)
            .await
            .map_err(|e| classify(name, e))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<TenantInfo>> {
        let selector = format!("{}={}", MANAGED_BY_LABEL_KEY, self.manager);
        let list = self.api.list(&ListParams::default().labels(&selector)).await?;
        Ok(list.items)
    }
}

/// Emits Kubernetes Events against a tenant's `TenantInfo` object.
#[derive(Clone)]
pub struct EventRecorder {
    client: Client,
    reporter: Reporter,
    namespace: String,
}

impl EventRecorder {
    pub fn new(client: Client, operator_name: &str, instance: Option<String>, namespace: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: operator_name.to_string(),
                instance,
            },
            namespace: namespace.to_string(),
        }
    }

    pub fn reference_for(&self, tenant: &str) -> ObjectReference {
        ObjectReference {
            api_version: Some(TenantInfo::api_version(&()).into_owned()),
            kind: Some(TenantInfo::kind(&()).into_owned()),
            name: Some(tenant_info_name(tenant)),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        }
    }

    pub async fn reconcile_failed(&self, tenant: &str, consecutive_failures: u32, error: &Error) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), self.reference_for(tenant));
        let event = Event {
            type_: EventType::Warning,
            reason: "ReconcileFailed".to_string(),
            note: Some(format!(
                "{} consecutive failed passes for tenant {}: {}",
                consecutive_failures, tenant, error
            )),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(event).await {
            warn!(tenant, error = %e, "failed to emit diagnostic event");
        }
    }
}
