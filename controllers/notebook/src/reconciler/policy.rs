//! Culling policy resolution.
//!
//! A notebook's effective policy is the most specific one that exists:
//! workload scope (named after the notebook), then tenant scope (`default`
//! in the notebook's namespace), then cluster scope (`default` in the system
//! namespace). All three lookups run; the pick is by rank, not by order.

use super::Reconciler;
use crate::error::ControllerError;
use crds::{CullingOptions, CullingPolicy, Notebook, POLICY_DEFAULT_NAME};
use kube::ResourceExt;
use tracing::debug;

/// Where a policy applies, ordered from least to most specific
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyScope {
    /// `default` in the system namespace
    Cluster,
    /// `default` in the notebook's namespace
    Tenant,
    /// Named after the notebook, in its namespace
    Workload,
}

/// Policy chosen for a notebook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    /// Scope the policy was found at
    pub scope: PolicyScope,
    /// `namespace/name` of the policy object
    pub source: String,
    /// Policy options with admission defaults applied
    pub options: CullingOptions,
}

/// Pick the most specific policy among the candidates that exist.
#[must_use]
pub fn select_most_specific(
    candidates: impl IntoIterator<Item = (PolicyScope, Option<CullingPolicy>)>,
) -> Option<ResolvedPolicy> {
    candidates
        .into_iter()
        .filter_map(|(scope, policy)| policy.map(|p| (scope, p)))
        .max_by_key(|(scope, _)| *scope)
        .map(|(scope, policy)| ResolvedPolicy {
            scope,
            source: format!("{}/{}", policy.namespace().unwrap_or_default(), policy.name_any()),
            options: policy.spec.options.with_defaults(),
        })
}

impl Reconciler {
    /// Effective culling policy for `notebook`, if any scope defines one.
    ///
    /// # Errors
    ///
    /// Store failures on any of the three lookups.
    pub async fn resolve_policy(&self, notebook: &Notebook) -> Result<Option<ResolvedPolicy>, ControllerError> {
        let namespace = notebook.namespace().unwrap_or_default();
        let name = notebook.name_any();
        let system_namespace = &self.config.system_namespace;

        let workload = self.store.get_culling_policy(&namespace, &name).await?;
        let tenant = self
            .store
            .get_culling_policy(&namespace, POLICY_DEFAULT_NAME)
            .await?;
        let cluster = self
            .store
            .get_culling_policy(system_namespace, POLICY_DEFAULT_NAME)
            .await?;

        let resolved = select_most_specific([
            (PolicyScope::Workload, workload),
            (PolicyScope::Tenant, tenant),
            (PolicyScope::Cluster, cluster),
        ]);
        match &resolved {
            Some(policy) => debug!(
                "Notebook {}/{} uses {:?} culling policy {}",
                namespace, name, policy.scope, policy.source
            ),
            None => debug!("No culling policy applies to notebook {}/{}", namespace, name),
        }
        Ok(resolved)
    }
}
