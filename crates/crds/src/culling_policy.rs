//! CullingPolicy CRD
//!
//! Idle-culling options for notebooks. A policy applies at one of three
//! scopes, decided by its name and namespace:
//! - workload: named after the notebook, in the notebook's namespace
//! - tenant: named `default`, in the notebook's namespace
//! - cluster: named `default`, in the system namespace

use crate::duration::parse_duration;
use crate::error::CrdError;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name shared by tenant- and cluster-scope policies
pub const POLICY_DEFAULT_NAME: &str = "default";

/// Idle duration applied when a policy leaves it empty
pub const DEFAULT_IDLE_DURATION: &str = "24h";

/// Check interval applied when a policy leaves it empty
pub const DEFAULT_CHECK_INTERVAL: &str = "1m";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "kubeflow.org",
    version = "v1",
    kind = "CullingPolicy",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct CullingPolicySpec {
    /// Culling options
    #[serde(default)]
    pub options: CullingOptions,
}

/// Idle-culling options of a policy
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CullingOptions {
    /// How often idleness is checked (e.g. `1m`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// How long a notebook may stay idle before it is culled (e.g. `24h`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

fn is_unset(value: Option<&String>) -> bool {
    value.is_none_or(|v| v.is_empty())
}

impl CullingOptions {
    /// Fill empty fields with the admission defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if is_unset(self.duration.as_ref()) {
            self.duration = Some(DEFAULT_IDLE_DURATION.to_string());
        }
        if is_unset(self.interval.as_ref()) {
            self.interval = Some(DEFAULT_CHECK_INTERVAL.to_string());
        }
        self
    }

    /// Idle threshold, with the default applied when empty.
    ///
    /// # Errors
    ///
    /// Returns a [`CrdError`] when the configured string is malformed.
    pub fn idle_duration(&self) -> Result<Duration, CrdError> {
        parse_duration(
            self.duration
                .as_deref()
                .filter(|d| !d.is_empty())
                .unwrap_or(DEFAULT_IDLE_DURATION),
        )
    }

    /// Check interval, with the default applied when empty.
    ///
    /// # Errors
    ///
    /// Returns a [`CrdError`] when the configured string is malformed.
    pub fn check_interval(&self) -> Result<Duration, CrdError> {
        parse_duration(
            self.interval
                .as_deref()
                .filter(|i| !i.is_empty())
                .unwrap_or(DEFAULT_CHECK_INTERVAL),
        )
    }
}

impl CullingPolicy {
    /// Admission-time checks.
    ///
    /// # Errors
    ///
    /// Rejects a policy in `system_namespace` not named `default`, and any
    /// policy whose duration strings do not parse.
    pub fn validate(&self, system_namespace: &str) -> Result<(), CrdError> {
        let namespace = self.namespace().unwrap_or_default();
        let name = self.name_any();
        if namespace == system_namespace && name != POLICY_DEFAULT_NAME {
            return Err(CrdError::InvalidPolicyName { namespace, name });
        }
        self.spec.options.idle_duration()?;
        self.spec.options.check_interval()?;
        Ok(())
    }
}
