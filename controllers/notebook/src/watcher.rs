//! Kubernetes resource watchers.
//!
//! Two `kube_runtime::Controller` loops share one [`Reconciler`]:
//!
//! - the notebook loop watches Notebooks, the StatefulSets and Services they
//!   own, and labelled pods
//! - the culling loop watches Notebooks, labelled StatefulSets and every
//!   CullingPolicy change
//!
//! Each loop queues notebook keys; the runtime never runs two reconciles of
//! the same key at once within a loop.

use crate::error::ControllerError;
use crate::mappers;
use crate::probes::Readiness;
use crate::reconciler::{Outcome, Reconciler};
use crds::{CullingPolicy, NOTEBOOK_NAME_LABEL, Notebook};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::reflector::Store;
use kube_runtime::{Controller, WatchStreamExt, watcher};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Api handle honoring the configured watch namespace
fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Run one reconcile under the deadline and keep the key's backoff in step.
async fn reconcile_with<F, Fut>(
    loop_name: &'static str,
    notebook: Arc<Notebook>,
    ctx: Arc<Reconciler>,
    pass: F,
) -> Result<Action, ControllerError>
where
    F: FnOnce(Arc<Reconciler>, String, String) -> Fut,
    Fut: Future<Output = Result<Outcome, ControllerError>>,
{
    let namespace = notebook.namespace().unwrap_or_default();
    let name = notebook.name_any();
    let key = format!("{loop_name}/{namespace}/{name}");
    debug!("Reconciling {}", key);

    let outcome = ctx
        .with_deadline(&key, pass(ctx.clone(), namespace, name))
        .await?;
    ctx.reset_error(&key);
    Ok(outcome.into_action())
}

/// Requeue a failed key with its own Fibonacci backoff
fn requeue_with_backoff(
    loop_name: &'static str,
    notebook: &Notebook,
    err: &ControllerError,
    ctx: &Reconciler,
) -> Action {
    let key = format!(
        "{loop_name}/{}/{}",
        notebook.namespace().unwrap_or_default(),
        notebook.name_any()
    );
    ctx.increment_error(&key);
    let (delay, errors) = ctx.get_backoff_for_resource(&key);
    warn!(
        "Reconcile of {} failed ({} consecutive errors), retrying in {:?}: {}",
        key, errors, delay, err
    );
    Action::requeue(delay)
}

async fn reconcile_notebook(notebook: Arc<Notebook>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    reconcile_with("notebook", notebook, ctx, |r, ns, name| async move {
        r.reconcile_notebook(&ns, &name).await
    })
    .await
}

fn notebook_error_policy(notebook: Arc<Notebook>, err: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    requeue_with_backoff("notebook", &notebook, err, &ctx)
}

async fn reconcile_culling(notebook: Arc<Notebook>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    reconcile_with("culler", notebook, ctx, |r, ns, name| async move {
        r.reconcile_culling(&ns, &name).await
    })
    .await
}

fn culling_error_policy(notebook: Arc<Notebook>, err: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    requeue_with_backoff("culler", &notebook, err, &ctx)
}

/// Mark the loop ready once its notebook cache has seen the first full list
async fn report_synced(loop_name: &'static str, notebooks: Store<Notebook>, readiness: Readiness) {
    match notebooks.wait_until_ready().await {
        Ok(()) => {
            info!("{} loop synced {} notebooks", loop_name, notebooks.state().len());
            readiness.mark_synced();
        }
        Err(e) => warn!("{} loop stopped before syncing: {}", loop_name, e),
    }
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
    readiness: Readiness,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, client: Client, readiness: Readiness) -> Self {
        Self {
            reconciler,
            client,
            readiness,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        scoped_api(
            self.client.clone(),
            self.reconciler.config.watch_namespace.as_deref(),
        )
    }

    fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig::default().concurrency(self.reconciler.config.concurrency)
    }

    /// Runs the desired-state loop until shutdown.
    pub async fn watch_notebooks(&self) -> Result<(), ControllerError> {
        info!("Starting Notebook watcher");

        let labelled = watcher::Config::default().labels(NOTEBOOK_NAME_LABEL);
        let controller = Controller::new(self.api::<Notebook>(), watcher::Config::default());
        let synced = report_synced("notebook", controller.store(), self.readiness.clone());

        let run = controller
            .owns(self.api::<StatefulSet>(), watcher::Config::default())
            .owns(self.api::<Service>(), watcher::Config::default())
            .watches(self.api::<Pod>(), labelled, |pod| mappers::pod_to_notebook(&pod))
            .with_config(self.runtime_config())
            .shutdown_on_signal()
            .run(reconcile_notebook, notebook_error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _action)) => debug!("Reconciled notebook {}", obj),
                    Err(e) => error!("Notebook controller error: {}", e),
                }
            });
        tokio::join!(run, synced);

        info!("Notebook watcher stopped");
        Ok(())
    }

    /// Runs the idle-culling loop until shutdown.
    pub async fn watch_culling(&self) -> Result<(), ControllerError> {
        info!("Starting culling watcher");

        let controller = Controller::new(self.api::<Notebook>(), watcher::Config::default());
        let notebooks = controller.store();
        let synced = report_synced("culling", notebooks.clone(), self.readiness.clone());
        let system_namespace = self.reconciler.config.system_namespace.clone();

        // Applied objects only: deleting a policy never triggers a pass
        let policy_changes = watcher(self.api::<CullingPolicy>(), watcher::Config::default())
            .default_backoff()
            .applied_objects();

        let run = controller
            .watches(
                self.api::<StatefulSet>(),
                watcher::Config::default().labels(NOTEBOOK_NAME_LABEL),
                |workload| mappers::workload_to_notebook(&workload),
            )
            .watches_stream(policy_changes, move |policy| {
                mappers::policy_to_notebooks(&policy, &notebooks.state(), &system_namespace)
            })
            .with_config(self.runtime_config())
            .shutdown_on_signal()
            .run(reconcile_culling, culling_error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!("Culling pass for {} done, next: {:?}", obj, action),
                    Err(e) => error!("Culling controller error: {}", e),
                }
            });
        tokio::join!(run, synced);

        info!("Culling watcher stopped");
        Ok(())
    }
}
