//! Test utilities for unit testing reconcilers
//!
//! Builders for notebooks, pods, policies and workloads, plus a reconciler
//! wired to the in-memory store and a mock activity oracle.

use crate::config::ControllerConfig;
use crate::reconciler::Reconciler;
use crate::reconciler::notebook::desired_workload;
use crate::store::mock::MockStore;
use crds::{CullingOptions, CullingPolicy, CullingPolicySpec, Notebook, NotebookSpec, NotebookTemplateSpec};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Container, ContainerState, ContainerStatus, Pod, PodCondition, PodSpec, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kernel_client::MockActivityOracle;
use std::sync::Arc;

/// Namespace holding the cluster-wide policy in tests
pub const SYSTEM_NAMESPACE: &str = "kubeflow";

/// Reconciler over `store` and `oracle` with default configuration
pub fn reconciler_with(store: MockStore, oracle: MockActivityOracle) -> Reconciler {
    Reconciler::new(Arc::new(store), Arc::new(oracle), ControllerConfig::default())
}

/// Notebook with a single container named after it
pub fn create_test_notebook(namespace: &str, name: &str) -> Notebook {
    Notebook {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{namespace}-{name}")),
            ..Default::default()
        },
        spec: NotebookSpec {
            template: NotebookTemplateSpec {
                spec: PodSpec {
                    containers: vec![Container {
                        name: name.to_string(),
                        image: Some("jupyter/minimal-notebook".to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            },
        },
        status: None,
    }
}

/// Culling policy with the given interval and duration strings
pub fn create_test_policy(
    namespace: &str,
    name: &str,
    interval: Option<&str>,
    duration: Option<&str>,
) -> CullingPolicy {
    CullingPolicy {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: CullingPolicySpec {
            options: CullingOptions {
                interval: interval.map(str::to_string),
                duration: duration.map(str::to_string),
            },
        },
    }
}

/// Workload exactly as the desired-state loop would create it
pub fn create_test_workload(notebook: &Notebook) -> StatefulSet {
    desired_workload(notebook, None, &ControllerConfig::default()).unwrap()
}

/// API timestamp from an RFC3339 string
pub fn time(rfc3339: &str) -> Time {
    serde_json::from_value(serde_json::Value::String(rfc3339.to_string())).unwrap()
}

/// Pod condition with optional timestamps
pub fn pod_condition(type_: &str, status: &str, transition: Option<&str>) -> PodCondition {
    PodCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        last_transition_time: transition.map(time),
        ..Default::default()
    }
}

/// First pod of a notebook's workload
pub fn create_test_pod(
    notebook: &Notebook,
    conditions: Vec<PodCondition>,
    container_states: Vec<(&str, ContainerState)>,
) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(notebook.pod_name()),
            namespace: notebook.metadata.namespace.clone(),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            conditions: Some(conditions),
            container_statuses: Some(
                container_states
                    .into_iter()
                    .map(|(name, state)| ContainerStatus {
                        name: name.to_string(),
                        state: Some(state),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
    }
}
