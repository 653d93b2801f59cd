//! Desired-state reconciliation for Notebook resources.
//!
//! For each notebook: upsert a one-replica StatefulSet and a ClusterIP
//! Service, then mirror the first pod's conditions and container state onto
//! `notebook.status`. Replicas are forced back to 1 unless the culling loop
//! has set the stop annotation on the workload.

use super::{Outcome, Reconciler};
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconcile_helpers::{is_derivative, to_utc, upsert_env};
use chrono::{DateTime, Utc};
use crds::{
    NOTEBOOK_NAME_LABEL, Notebook, NotebookCondition, NotebookStatus, STOP_ANNOTATION,
    WORKLOAD_SELECTOR_LABEL, is_annotation_true,
};
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ContainerPort, Pod, PodCondition, PodSecurityContext, PodSpec, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Port the Service exposes
pub const DEFAULT_SERVING_PORT: i32 = 80;
/// Name given to the defaulted container port
pub const DEFAULT_CONTAINER_PORT_NAME: &str = "notebook-port";
/// Working directory applied when the container sets none
pub const DEFAULT_WORKING_DIR: &str = "/home/jovyan";
/// Environment variable carrying the notebook's URL prefix
pub const PREFIX_ENV_VAR: &str = "NB_PREFIX";

/// Workload annotation holding the hash of the rendered pod template
pub const TEMPLATE_HASH_ANNOTATION: &str = "notebooks.kubeflow.org/template-hash";

/// Event reason for a failed workload upsert
pub const REASON_WORKLOAD_UPDATE_FAILED: &str = "StatefulSetUpdateFailed";
/// Event reason for a failed service upsert
pub const REASON_SERVICE_UPDATE_FAILED: &str = "ServiceUpdateFailed";

fn controller_ref(notebook: &Notebook) -> Result<OwnerReference, ControllerError> {
    notebook.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::InvalidNotebook(
            notebook.name_any(),
            "metadata.name and metadata.uid are required".to_string(),
        )
    })
}

/// Add `owner` as controller of `meta`, refusing to steal objects another
/// controller already owns.
fn ensure_controller_ref(
    meta: &mut ObjectMeta,
    owner: OwnerReference,
    kind: &'static str,
) -> Result<(), ControllerError> {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    if refs
        .iter()
        .any(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(ControllerError::OwnershipConflict {
            kind,
            name: format!(
                "{}/{}",
                meta.namespace.as_deref().unwrap_or_default(),
                meta.name.as_deref().unwrap_or_default()
            ),
        });
    }
    if !refs.iter().any(|r| r.uid == owner.uid) {
        refs.push(owner);
    }
    Ok(())
}

fn fresh_meta(notebook: &Notebook) -> ObjectMeta {
    ObjectMeta {
        name: Some(notebook.workload_name()),
        namespace: notebook.namespace(),
        ..ObjectMeta::default()
    }
}

/// Pod spec derived from the notebook template plus controller defaults.
///
/// # Errors
///
/// The template must declare at least one container.
pub fn notebook_pod_spec(
    notebook: &Notebook,
    config: &ControllerConfig,
) -> Result<PodSpec, ControllerError> {
    let mut spec = notebook.spec.template.spec.clone();

    if config.add_fs_group && spec.security_context.is_none() {
        spec.security_context = Some(PodSecurityContext {
            fs_group: Some(config.fs_group),
            ..PodSecurityContext::default()
        });
    }

    let container = spec.containers.first_mut().ok_or_else(|| {
        ControllerError::InvalidNotebook(
            notebook.name_any(),
            "pod template declares no containers".to_string(),
        )
    })?;

    if container.working_dir.as_deref().unwrap_or_default().is_empty() {
        container.working_dir = Some(DEFAULT_WORKING_DIR.to_string());
    }
    if container.ports.is_none() {
        container.ports = Some(vec![ContainerPort {
            container_port: crds::DEFAULT_CONTAINER_PORT,
            name: Some(DEFAULT_CONTAINER_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            ..ContainerPort::default()
        }]);
    }
    upsert_env(
        container.env.get_or_insert_with(Vec::new),
        PREFIX_ENV_VAR,
        notebook.route_prefix(),
    );

    Ok(spec)
}

/// SHA-256 of the pod spec rendered from the notebook.
///
/// Stored on the workload so that a field removed from the notebook changes
/// the workload too; the semantic comparison alone ignores absent fields.
fn template_hash(spec: &PodSpec) -> Result<String, ControllerError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(spec)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Workload the notebook should have, built on top of `existing` so fields
/// the controller does not manage are carried over untouched.
///
/// # Errors
///
/// Invalid notebooks and ownership conflicts.
pub fn desired_workload(
    notebook: &Notebook,
    existing: Option<&StatefulSet>,
    config: &ControllerConfig,
) -> Result<StatefulSet, ControllerError> {
    let name = notebook.workload_name();
    let mut workload = existing.cloned().unwrap_or_else(|| StatefulSet {
        metadata: fresh_meta(notebook),
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            ..StatefulSetSpec::default()
        }),
        status: None,
    });

    ensure_controller_ref(&mut workload.metadata, controller_ref(notebook)?, "StatefulSet")?;
    workload
        .labels_mut()
        .insert(NOTEBOOK_NAME_LABEL.to_string(), name.clone());
    let stopped = is_annotation_true(workload.metadata.annotations.as_ref(), STOP_ANNOTATION);

    let pod_spec = notebook_pod_spec(notebook, config)?;
    workload
        .annotations_mut()
        .insert(TEMPLATE_HASH_ANNOTATION.to_string(), template_hash(&pod_spec)?);
    let spec = workload.spec.get_or_insert_with(StatefulSetSpec::default);

    if !stopped {
        spec.replicas = Some(1);
    }
    spec.selector = LabelSelector {
        match_labels: Some(BTreeMap::from([(
            WORKLOAD_SELECTOR_LABEL.to_string(),
            name.clone(),
        )])),
        ..LabelSelector::default()
    };

    // Existing template labels, then ours, then the notebook's; the selector
    // label always matches so the workload keeps selecting its pods.
    let mut labels = spec
        .template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    labels.insert(WORKLOAD_SELECTOR_LABEL.to_string(), name.clone());
    labels.insert(NOTEBOOK_NAME_LABEL.to_string(), name.clone());
    labels.extend(notebook.labels().clone());
    labels.insert(WORKLOAD_SELECTOR_LABEL.to_string(), name);

    spec.template
        .metadata
        .get_or_insert_with(ObjectMeta::default)
        .labels = Some(labels);
    spec.template.spec = Some(pod_spec);

    Ok(workload)
}

/// Service the notebook should have, built on top of `existing`.
///
/// # Errors
///
/// Invalid notebooks and ownership conflicts.
pub fn desired_service(
    notebook: &Notebook,
    existing: Option<&Service>,
) -> Result<Service, ControllerError> {
    let name = notebook.workload_name();
    let mut service = existing.cloned().unwrap_or_else(|| Service {
        metadata: fresh_meta(notebook),
        ..Service::default()
    });

    ensure_controller_ref(&mut service.metadata, controller_ref(notebook)?, "Service")?;

    let spec = service.spec.get_or_insert_with(ServiceSpec::default);
    spec.type_ = Some("ClusterIP".to_string());
    spec.selector = Some(BTreeMap::from([(WORKLOAD_SELECTOR_LABEL.to_string(), name.clone())]));
    spec.ports = Some(vec![ServicePort {
        // http-<name> lets mesh policies recognise the port as HTTP
        name: Some(format!("http-{name}")),
        port: DEFAULT_SERVING_PORT,
        target_port: Some(IntOrString::Int(notebook.container_port())),
        protocol: Some("TCP".to_string()),
        ..ServicePort::default()
    }]);

    Ok(service)
}

fn condition_from_pod(
    pod_condition: &PodCondition,
    previous: Option<&NotebookCondition>,
    now: DateTime<Utc>,
) -> NotebookCondition {
    let stamp = |observed: Option<DateTime<Utc>>, prior: Option<DateTime<Utc>>| {
        observed.or(prior).unwrap_or(now)
    };
    NotebookCondition {
        type_: pod_condition.type_.clone(),
        status: pod_condition.status.clone(),
        last_probe_time: Some(stamp(
            pod_condition.last_probe_time.as_ref().and_then(to_utc),
            previous.and_then(|p| p.last_probe_time),
        )),
        last_transition_time: Some(stamp(
            pod_condition.last_transition_time.as_ref().and_then(to_utc),
            previous.and_then(|p| p.last_transition_time),
        )),
        reason: pod_condition.reason.clone().filter(|r| !r.is_empty()),
        message: pod_condition.message.clone().filter(|m| !m.is_empty()),
    }
}

/// Status to publish for `notebook`.
///
/// Missing timestamps on pod conditions are stamped with the time already
/// recorded for that condition type, or `now` for a new one, so repeated
/// reconciles of an unchanged pod produce an identical status.
#[must_use]
pub fn notebook_status(
    notebook: &Notebook,
    workload: &StatefulSet,
    pod: Option<&Pod>,
    now: DateTime<Utc>,
) -> NotebookStatus {
    let previous = notebook.status.clone().unwrap_or_default();
    let ready_replicas = workload
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);

    let Some(pod_status) = pod.and_then(|p| p.status.as_ref()) else {
        return NotebookStatus {
            ready_replicas,
            ..previous
        };
    };

    let name = notebook.name_any();
    let container_state = pod_status
        .container_statuses
        .iter()
        .flatten()
        .find(|cs| cs.name == name)
        .map_or_else(
            || {
                debug!(
                    "Pod of notebook {} has no container named after it, keeping containerState",
                    name
                );
                previous.container_state.clone()
            },
            |cs| cs.state.clone().unwrap_or_default(),
        );

    let conditions = pod_status
        .conditions
        .iter()
        .flatten()
        .map(|pc| {
            let prior = previous.conditions.iter().find(|c| c.type_ == pc.type_);
            condition_from_pod(pc, prior, now)
        })
        .collect();

    NotebookStatus {
        conditions,
        ready_replicas,
        container_state,
    }
}

fn unchanged<T: serde::Serialize>(desired: &T, existing: &T) -> Result<bool, ControllerError> {
    Ok(is_derivative(
        &serde_json::to_value(desired)?,
        &serde_json::to_value(existing)?,
    ))
}

impl Reconciler {
    /// Reconcile one notebook by identity.
    ///
    /// # Errors
    ///
    /// Store failures and failed child upserts; the caller requeues.
    pub async fn reconcile_notebook(&self, namespace: &str, name: &str) -> Result<Outcome, ControllerError> {
        let Some(notebook) = self.store.get_notebook(namespace, name).await? else {
            debug!("Notebook {}/{} not found, nothing to do", namespace, name);
            return Ok(Outcome::done());
        };

        // Children are being torn down by foreground deletion; recreating
        // them would fight the garbage collector.
        if notebook.is_terminating() {
            debug!("Notebook {}/{} is terminating, skipping", namespace, name);
            return Ok(Outcome::done());
        }

        let workload = match self.upsert_workload(&notebook).await {
            Ok(workload) => workload,
            Err(e) => {
                self.warn(&notebook, REASON_WORKLOAD_UPDATE_FAILED, &e).await;
                return Err(e);
            }
        };

        if let Err(e) = self.upsert_service(&notebook).await {
            self.warn(&notebook, REASON_SERVICE_UPDATE_FAILED, &e).await;
            return Err(e);
        }

        let pod = self.store.get_pod(namespace, &notebook.pod_name()).await?;
        if pod.is_none() {
            debug!("Pod of notebook {}/{} not found yet", namespace, name);
        }

        let status = notebook_status(&notebook, &workload, pod.as_ref(), Utc::now());
        if notebook.status.as_ref() == Some(&status) {
            debug!("Notebook {}/{} status unchanged", namespace, name);
        } else {
            info!("Updating status of notebook {}/{}", namespace, name);
            self.store.patch_notebook_status(&notebook, &status).await?;
        }

        Ok(Outcome::done())
    }

    async fn upsert_workload(&self, notebook: &Notebook) -> Result<StatefulSet, ControllerError> {
        let namespace = notebook.namespace().unwrap_or_default();
        let name = notebook.workload_name();
        let existing = self.store.get_workload(&namespace, &name).await?;
        let desired = desired_workload(notebook, existing.as_ref(), &self.config)?;

        match existing {
            None => {
                info!("Creating StatefulSet {}/{}", namespace, name);
                Ok(self.store.create_workload(&desired).await?)
            }
            Some(existing) if unchanged(&desired, &existing)? => Ok(existing),
            Some(_) => {
                info!("Updating StatefulSet {}/{}", namespace, name);
                Ok(self.store.replace_workload(&desired).await?)
            }
        }
    }

    async fn upsert_service(&self, notebook: &Notebook) -> Result<Service, ControllerError> {
        let namespace = notebook.namespace().unwrap_or_default();
        let name = notebook.workload_name();
        let existing = self.store.get_service(&namespace, &name).await?;
        let desired = desired_service(notebook, existing.as_ref())?;

        match existing {
            None => {
                info!("Creating Service {}/{}", namespace, name);
                Ok(self.store.create_service(&desired).await?)
            }
            Some(existing) if unchanged(&desired, &existing)? => Ok(existing),
            Some(_) => {
                info!("Updating Service {}/{}", namespace, name);
                Ok(self.store.replace_service(&desired).await?)
            }
        }
    }

    async fn warn(&self, notebook: &Notebook, reason: &str, error: &ControllerError) {
        if let Err(e) = self
            .store
            .publish_warning(notebook, reason, &error.to_string())
            .await
        {
            warn!(
                "Failed to publish {} event for notebook {}/{}: {}",
                reason,
                notebook.namespace().unwrap_or_default(),
                notebook.name_any(),
                e
            );
        }
    }
}
