//! Notebook Controller
//!
//! Runs two control loops over the `Notebook` custom resource:
//! - desired state: one StatefulSet and one Service per notebook, with the
//!   first pod's status mirrored back onto the notebook
//! - idle culling: scales notebooks whose kernels have been idle longer than
//!   their `CullingPolicy` allows down to zero
//!
//! The culling loop only sets the stop annotation; the desired-state loop
//! honors it and never scales a stopped notebook back up.

mod backoff;
mod config;
mod controller;
mod error;
mod mappers;
mod probes;
mod reconcile_helpers;
mod reconciler;
mod store;
mod watcher;

#[cfg(test)]
mod reconcile_helpers_test;
#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Notebook Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!(
        "  Namespace: {}",
        config.watch_namespace.as_deref().unwrap_or("all namespaces")
    );
    info!("  System namespace: {}", config.system_namespace);
    info!(
        "  fsGroup: {}",
        if config.add_fs_group {
            config.fs_group.to_string()
        } else {
            "disabled".to_string()
        }
    );
    info!("  Culling: {}", if config.enable_culling { "enabled" } else { "disabled" });
    info!(
        "  Kernel endpoint: {}",
        config
            .kernel_endpoint_base
            .as_deref()
            .unwrap_or("in-cluster service DNS")
    );
    info!("  Concurrency: {}", config.concurrency);
    info!("  Probes: {}", config.probe_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
