//! Cluster store abstraction.
//!
//! The reconcilers never touch `kube::Api` directly. They read and write
//! through [`ClusterStore`], which `KubeStore` implements against the API
//! server and `MockStore` implements in memory for unit tests.
//!
//! Conventions:
//! - not-found is `Ok(None)`, never an error
//! - writes to existing objects carry the previously read
//!   `metadata.resourceVersion`; a concurrent write makes them fail with
//!   [`StoreError::Conflict`]

pub mod kube_store;
#[cfg(test)]
pub mod mock;

pub use kube_store::KubeStore;

use crds::{CullingPolicy, Notebook, NotebookStatus};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use thiserror::Error;

/// Errors surfaced by a [`ClusterStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Optimistic concurrency check failed
    #[error("Conflict writing {0}")]
    Conflict(String),

    /// Create raced with another creator
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Patch body could not be built
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store could not serve the request (used by test doubles)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// CRUD surface the control loops need from the cluster
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    // Notebooks
    async fn get_notebook(&self, namespace: &str, name: &str) -> Result<Option<Notebook>, StoreError>;
    /// Replace the status of `notebook`, conditional on its resource version
    async fn patch_notebook_status(
        &self,
        notebook: &Notebook,
        status: &NotebookStatus,
    ) -> Result<Notebook, StoreError>;

    // Workloads
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, StoreError>;
    async fn create_workload(&self, workload: &StatefulSet) -> Result<StatefulSet, StoreError>;
    /// Full update; `workload` carries the resource version it was read at
    async fn replace_workload(&self, workload: &StatefulSet) -> Result<StatefulSet, StoreError>;
    /// Set the stop annotation and scale to zero, conditional on the
    /// resource version of `workload`
    async fn stop_workload(&self, workload: &StatefulSet) -> Result<StatefulSet, StoreError>;

    // Services
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, StoreError>;
    async fn create_service(&self, service: &Service) -> Result<Service, StoreError>;
    async fn replace_service(&self, service: &Service) -> Result<Service, StoreError>;

    // Lookups
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError>;
    async fn get_culling_policy(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CullingPolicy>, StoreError>;

    // Events
    /// Emit a Warning event against `notebook`
    async fn publish_warning(
        &self,
        notebook: &Notebook,
        reason: &str,
        message: &str,
    ) -> Result<(), StoreError>;
}
