//! Watch-event mappers.
//!
//! Translate events on secondary objects (pods, workloads, culling policies)
//! into the notebook keys the control loops reconcile.

use crds::{CullingPolicy, NOTEBOOK_NAME_LABEL, Notebook};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::{Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use tracing::{debug, warn};

/// Notebook owning a labelled pod.
///
/// Pods carry the `notebook-name` label through the workload's pod template.
#[must_use]
pub fn pod_to_notebook(pod: &Pod) -> Option<ObjectRef<Notebook>> {
    let name = pod.labels().get(NOTEBOOK_NAME_LABEL)?;
    let namespace = pod.namespace()?;
    Some(ObjectRef::new(name).within(&namespace))
}

/// Notebook controlling a workload.
///
/// The label is a cheap pre-filter; only a controller reference to a
/// Notebook of our API group and version counts.
#[must_use]
pub fn workload_to_notebook(workload: &StatefulSet) -> Option<ObjectRef<Notebook>> {
    if !workload.labels().contains_key(NOTEBOOK_NAME_LABEL) {
        return None;
    }
    let namespace = workload.namespace()?;
    let owner = workload
        .owner_references()
        .iter()
        .find(|r| r.controller == Some(true))?;

    let api_version = Notebook::api_version(&());
    if owner.kind != Notebook::kind(&()) || owner.api_version != api_version {
        debug!(
            "StatefulSet {}/{} is controlled by {} {}, ignoring",
            namespace,
            workload.name_any(),
            owner.api_version,
            owner.kind
        );
        return None;
    }
    Some(ObjectRef::new(&owner.name).within(&namespace))
}

/// Notebooks affected by a change to `policy`.
///
/// A policy in the system namespace can be the cluster default for every
/// notebook; any other policy only reaches notebooks in its own namespace.
/// Invalid policies are reported but still fan out, so the culling pass can
/// settle each notebook on its own.
#[must_use]
pub fn policy_to_notebooks(
    policy: &CullingPolicy,
    notebooks: &[Arc<Notebook>],
    system_namespace: &str,
) -> Vec<ObjectRef<Notebook>> {
    if let Err(e) = policy.validate(system_namespace) {
        warn!(
            "CullingPolicy {}/{} is invalid: {}",
            policy.namespace().unwrap_or_default(),
            policy.name_any(),
            e
        );
    }

    let Some(namespace) = policy.namespace() else {
        return Vec::new();
    };
    let cluster_wide = namespace == system_namespace;

    notebooks
        .iter()
        .filter(|nb| cluster_wide || nb.namespace().as_deref() == Some(namespace.as_str()))
        .map(|nb| ObjectRef::from_obj(nb.as_ref()))
        .collect()
}
