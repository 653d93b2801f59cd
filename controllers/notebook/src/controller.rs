//! Main controller implementation.
//!
//! Builds the shared reconciler, starts the notebook loop, the culling loop
//! (unless disabled) and the probe server, then waits for the first of them
//! to exit.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::probes::{self, Readiness};
use crate::reconciler::Reconciler;
use crate::store::KubeStore;
use crate::watcher::Watcher;
use futures::future::select_all;
use kernel_client::JupyterKernelClient;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

type Task = (&'static str, JoinHandle<Result<(), ControllerError>>);

/// Main controller for notebook resources.
#[derive(Debug)]
pub struct Controller {
    tasks: Vec<Task>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Notebook Controller");

        let kube_client = Client::try_default().await?;

        let mut oracle = JupyterKernelClient::new(config.oracle_timeout)?;
        if let Some(base) = &config.kernel_endpoint_base {
            oracle = oracle.with_endpoint_base(base.clone());
        }

        let probe_addr = config.probe_addr;
        let enable_culling = config.enable_culling;
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeStore::new(kube_client.clone())),
            Arc::new(oracle),
            config,
        ));
        // Ready once each running loop has listed its notebooks
        let readiness = Readiness::new(if enable_culling { 2 } else { 1 });
        let watcher_instance = Arc::new(Watcher::new(reconciler, kube_client, readiness.clone()));

        let mut tasks: Vec<Task> = Vec::new();

        let notebook_watcher = {
            let watcher = Arc::clone(&watcher_instance);
            tokio::spawn(async move { watcher.watch_notebooks().await })
        };
        tasks.push(("Notebook watcher", notebook_watcher));

        if enable_culling {
            let culling_watcher = {
                let watcher = Arc::clone(&watcher_instance);
                tokio::spawn(async move { watcher.watch_culling().await })
            };
            tasks.push(("Culling watcher", culling_watcher));
        } else {
            info!("Culling disabled, idle notebooks will not be stopped");
        }

        let probe_server = tokio::spawn(async move { probes::serve(probe_addr, readiness).await });
        tasks.push(("Probe server", probe_server));

        Ok(Self { tasks })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Notebook Controller running");

        let (names, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();

        // Any task finishing ends the process; the loops exit on SIGTERM
        let (result, index, _remaining) = select_all(handles).await;
        let name = names.get(index).copied().unwrap_or("task");

        result
            .map_err(|e| ControllerError::Watch(format!("{name} panicked: {e}")))?
            .map_err(|e| ControllerError::Watch(format!("{name} error: {e}")))?;

        info!("{} exited, shutting down", name);
        Ok(())
    }
}
