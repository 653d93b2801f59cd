//! Notebook CRD
//!
//! A per-user interactive compute server. The controller materializes a
//! one-replica StatefulSet and a ClusterIP Service from the pod template,
//! and mirrors the first pod's state back onto the status block.

use crate::annotations::{IGNORE_CULLING_ANNOTATION, is_annotation_true};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerState, PodSpec};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Port used when the primary container declares none
pub const DEFAULT_CONTAINER_PORT: i32 = 8888;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubeflow.org",
    version = "v1",
    kind = "Notebook",
    namespaced,
    status = "NotebookStatus",
    shortname = "nb",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSpec {
    /// Pod template the workload is built from
    pub template: NotebookTemplateSpec,
}

/// Wrapper matching the `spec.template.spec` path of a pod template
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookTemplateSpec {
    /// Pod spec for the notebook server
    #[serde(default)]
    #[schemars(schema_with = "crate::preserve_unknown_fields")]
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookStatus {
    /// Conditions mirrored from the notebook's pod
    #[serde(default)]
    pub conditions: Vec<NotebookCondition>,

    /// Ready replicas reported by the workload
    #[serde(default)]
    pub ready_replicas: i32,

    /// Last observed state of the notebook container
    #[serde(default)]
    #[schemars(schema_with = "crate::preserve_unknown_fields")]
    pub container_state: ContainerState,
}

/// Pod condition copied onto the notebook
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookCondition {
    /// Condition type (e.g. `Ready`, `PodScheduled`)
    #[serde(rename = "type")]
    pub type_: String,

    /// `True`, `False` or `Unknown`
    pub status: String,

    /// Last time the condition was probed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<DateTime<Utc>>,

    /// Last time the condition changed status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Notebook {
    /// True once the API server has set a deletion timestamp
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// True when the notebook opted out of idle culling
    #[must_use]
    pub fn ignores_culling(&self) -> bool {
        is_annotation_true(self.metadata.annotations.as_ref(), IGNORE_CULLING_ANNOTATION)
    }

    /// First port of the primary container, or [`DEFAULT_CONTAINER_PORT`]
    #[must_use]
    pub fn container_port(&self) -> i32 {
        self.spec
            .template
            .spec
            .containers
            .first()
            .and_then(|c| c.ports.as_ref())
            .and_then(|ports| ports.first())
            .map_or(DEFAULT_CONTAINER_PORT, |p| p.container_port)
    }

    /// Name of the workload (and service) backing this notebook
    #[must_use]
    pub fn workload_name(&self) -> String {
        self.name_any()
    }

    /// Name of the single pod the workload runs
    #[must_use]
    pub fn pod_name(&self) -> String {
        format!("{}-0", self.name_any())
    }

    /// URL prefix the notebook server is routed under
    #[must_use]
    pub fn route_prefix(&self) -> String {
        format!(
            "/notebook/{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}
