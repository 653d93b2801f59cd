//! `ClusterStore` backed by the Kubernetes API server.

use super::{ClusterStore, StoreError};
use crds::{CullingPolicy, Notebook, NotebookStatus, STOP_ANNOTATION};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use serde_json::{Value, json};
use tracing::debug;

/// Field manager and event reporter name
pub const CONTROLLER_NAME: &str = "notebook-controller";

/// API-server backed store
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    recorder: Recorder,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

fn describe<K: Resource>(kind: &str, obj: &K) -> String {
    format!(
        "{} {}/{}",
        kind,
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default()
    )
}

/// Map 409 responses onto the store's conflict variants
fn classify(err: kube::Error, what: String) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            StoreError::AlreadyExists(what)
        }
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(what),
        other => StoreError::Kube(other),
    }
}

/// Merge-patch body replacing the whole status block.
///
/// Unset container-state branches are sent as `null` so a transition (e.g.
/// running to terminated) removes the stale branch instead of merging.
fn status_patch(resource_version: Option<&str>, status: &NotebookStatus) -> Result<Value, StoreError> {
    let mut status_value = serde_json::to_value(status)?;
    if let Some(state) = status_value
        .get_mut("containerState")
        .and_then(Value::as_object_mut)
    {
        for branch in ["running", "terminated", "waiting"] {
            state.entry(branch).or_insert(Value::Null);
        }
    }
    Ok(json!({
        "metadata": { "resourceVersion": resource_version },
        "status": status_value,
    }))
}

/// Merge-patch body that culls a workload
fn stop_patch(resource_version: Option<&str>) -> Value {
    json!({
        "metadata": {
            "resourceVersion": resource_version,
            "annotations": { STOP_ANNOTATION: "true" },
        },
        "spec": { "replicas": 0 },
    })
}

impl KubeStore {
    /// Create a store using `client` for reads, writes and events
    #[must_use]
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        }
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PatchParams::default()
        }
    }
}

#[async_trait::async_trait]
impl ClusterStore for KubeStore {
    async fn get_notebook(&self, namespace: &str, name: &str) -> Result<Option<Notebook>, StoreError> {
        Ok(self.api::<Notebook>(namespace).get_opt(name).await?)
    }

    async fn patch_notebook_status(
        &self,
        notebook: &Notebook,
        status: &NotebookStatus,
    ) -> Result<Notebook, StoreError> {
        let namespace = notebook.namespace().unwrap_or_default();
        let patch = status_patch(notebook.resource_version().as_deref(), status)?;
        debug!("Patching status of Notebook {}/{}", namespace, notebook.name_any());
        self.api::<Notebook>(&namespace)
            .patch_status(&notebook.name_any(), &Self::patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify(e, describe("Notebook", notebook)))
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, StoreError> {
        Ok(self.api::<StatefulSet>(namespace).get_opt(name).await?)
    }

    async fn create_workload(&self, workload: &StatefulSet) -> Result<StatefulSet, StoreError> {
        let namespace = workload.namespace().unwrap_or_default();
        self.api::<StatefulSet>(&namespace)
            .create(&Self::post_params(), workload)
            .await
            .map_err(|e| classify(e, describe("StatefulSet", workload)))
    }

    async fn replace_workload(&self, workload: &StatefulSet) -> Result<StatefulSet, StoreError> {
        let namespace = workload.namespace().unwrap_or_default();
        self.api::<StatefulSet>(&namespace)
            .replace(&workload.name_any(), &Self::post_params(), workload)
            .await
            .map_err(|e| classify(e, describe("StatefulSet", workload)))
    }

    async fn stop_workload(&self, workload: &StatefulSet) -> Result<StatefulSet, StoreError> {
        let namespace = workload.namespace().unwrap_or_default();
        let patch = stop_patch(workload.resource_version().as_deref());
        self.api::<StatefulSet>(&namespace)
            .patch(&workload.name_any(), &Self::patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify(e, describe("StatefulSet", workload)))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, StoreError> {
        Ok(self.api::<Service>(namespace).get_opt(name).await?)
    }

    async fn create_service(&self, service: &Service) -> Result<Service, StoreError> {
        let namespace = service.namespace().unwrap_or_default();
        self.api::<Service>(&namespace)
            .create(&Self::post_params(), service)
            .await
            .map_err(|e| classify(e, describe("Service", service)))
    }

    async fn replace_service(&self, service: &Service) -> Result<Service, StoreError> {
        let namespace = service.namespace().unwrap_or_default();
        self.api::<Service>(&namespace)
            .replace(&service.name_any(), &Self::post_params(), service)
            .await
            .map_err(|e| classify(e, describe("Service", service)))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError> {
        Ok(self.api::<Pod>(namespace).get_opt(name).await?)
    }

    async fn get_culling_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CullingPolicy>, StoreError> {
        Ok(self.api::<CullingPolicy>(namespace).get_opt(name).await?)
    }

    async fn publish_warning(
        &self,
        notebook: &Notebook,
        reason: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let event = Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        self.recorder
            .publish(&event, &notebook.object_ref(&()))
            .await?;
        Ok(())
    }
}
