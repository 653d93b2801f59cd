//! Controller configuration.
//!
//! Read once from the environment at startup and handed to each loop.
//! Nothing here changes after `main` builds it.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Immutable settings shared by both control loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Restrict watches to one namespace (`None` = all namespaces)
    pub watch_namespace: Option<String>,
    /// Namespace whose `default` CullingPolicy applies cluster-wide
    pub system_namespace: String,
    /// Apply `fs_group` to pods that carry no security context
    pub add_fs_group: bool,
    /// POSIX group applied when `add_fs_group` is set
    pub fs_group: i64,
    /// Run the idle-culling loop
    pub enable_culling: bool,
    /// Override for the kernel API base URL
    pub kernel_endpoint_base: Option<String>,
    /// HTTP timeout for kernel API requests
    pub oracle_timeout: Duration,
    /// Deadline for one reconcile attempt
    pub reconcile_timeout: Duration,
    /// Concurrent reconciles per loop
    pub concurrency: u16,
    /// Listen address of the health probe server
    pub probe_addr: SocketAddr,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            system_namespace: "kubeflow".to_string(),
            add_fs_group: true,
            fs_group: 100,
            enable_culling: true,
            kernel_endpoint_base: None,
            oracle_timeout: Duration::from_secs(10),
            reconcile_timeout: Duration::from_secs(30),
            concurrency: 4,
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{key}={value:?}: {e}")))
}

fn toggle(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

impl ControllerConfig {
    /// Load configuration from process environment variables
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidConfig`] for unparseable values.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidConfig`] for unparseable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.watch_namespace = get("WATCH_NAMESPACE");
        if let Some(ns) = get("SYSTEM_NAMESPACE") {
            config.system_namespace = ns;
        }
        if let Some(v) = get("ADD_FSGROUP") {
            config.add_fs_group = toggle(&v);
        }
        if let Some(v) = get("FSGROUP") {
            config.fs_group = parse("FSGROUP", &v)?;
        }
        if let Some(v) = get("ENABLE_CULLING") {
            config.enable_culling = toggle(&v);
        }
        config.kernel_endpoint_base = get("KERNEL_ENDPOINT_BASE");
        if let Some(v) = get("ORACLE_TIMEOUT_SECS") {
            config.oracle_timeout = Duration::from_secs(parse("ORACLE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("RECONCILE_TIMEOUT_SECS") {
            config.reconcile_timeout = Duration::from_secs(parse("RECONCILE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("CONTROLLER_CONCURRENCY") {
            config.concurrency = parse("CONTROLLER_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("PROBE_ADDR") {
            config.probe_addr = parse("PROBE_ADDR", &v)?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert!(config.add_fs_group);
        assert!(config.enable_culling);
        assert_eq!(config.system_namespace, "kubeflow");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("WATCH_NAMESPACE", "alice"),
            ("SYSTEM_NAMESPACE", "platform"),
            ("ADD_FSGROUP", "false"),
            ("FSGROUP", "1000"),
            ("ENABLE_CULLING", "TRUE"),
            ("KERNEL_ENDPOINT_BASE", "http://localhost:8001"),
            ("ORACLE_TIMEOUT_SECS", "3"),
            ("CONTROLLER_CONCURRENCY", "8"),
            ("PROBE_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("alice"));
        assert_eq!(config.system_namespace, "platform");
        assert!(!config.add_fs_group);
        assert_eq!(config.fs_group, 1000);
        assert!(config.enable_culling);
        assert_eq!(config.kernel_endpoint_base.as_deref(), Some("http://localhost:8001"));
        assert_eq!(config.oracle_timeout, Duration::from_secs(3));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.probe_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
    }

    #[test]
    fn test_toggle_disabled_by_any_other_value() {
        let config = load(&[("ENABLE_CULLING", "yes"), ("ADD_FSGROUP", "0")]).unwrap();
        assert!(!config.enable_culling);
        assert!(!config.add_fs_group);
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(matches!(
            load(&[("FSGROUP", "users")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            load(&[("PROBE_ADDR", "nowhere")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
