//! Cross-controller annotation and label protocol
//!
//! These keys are a stable contract between the desired-state loop, the
//! culling loop and anything else in the cluster that reads notebook state.

/// Set to `"true"` on a workload by the culling loop. While present, the
/// desired-state loop does not scale the workload back up.
pub const STOP_ANNOTATION: &str = "kubeflow-resource-stopped";

/// Set to `"true"` on a notebook to opt it out of idle culling.
pub const IGNORE_CULLING_ANNOTATION: &str = "culler.notebooks.kubeflow.org/ignore";

/// Reserved for recording the last observed activity on a workload. Unused.
pub const LAST_ACTIVITY_ANNOTATION: &str = "notebooks.kubeflow.org/last-activity";

/// Label carried by workloads and pods that belong to a notebook.
pub const NOTEBOOK_NAME_LABEL: &str = "notebook-name";

/// Selector label tying the pod template to its workload.
pub const WORKLOAD_SELECTOR_LABEL: &str = "statefulset";

/// Returns true when `key` is present in `annotations` with the value `"true"`.
pub fn is_annotation_true(
    annotations: Option<&std::collections::BTreeMap<String, String>>,
    key: &str,
) -> bool {
    annotations
        .and_then(|a| a.get(key))
        .is_some_and(|value| value == "true")
}
