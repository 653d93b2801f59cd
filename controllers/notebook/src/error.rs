//! Controller-specific error types.
//!
//! Every failure here is scoped to a single reconcile attempt; the loop's
//! error policy requeues the key with backoff.

use crate::store::StoreError;
use crds::CrdError;
use kernel_client::KernelClientError;
use kube::Error as KubeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the Notebook Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client setup error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster read/write failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Activity oracle could not be queried
    #[error("Kernel activity error: {0}")]
    Oracle(#[from] KernelClientError),

    /// CRD contents rejected
    #[error("Invalid resource: {0}")]
    Crd(#[from] CrdError),

    /// Object could not be converted for comparison
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Notebook cannot be materialized (e.g. no containers)
    #[error("Invalid notebook {0}: {1}")]
    InvalidNotebook(String, String),

    /// Child object is controlled by something other than the notebook
    #[error("{kind} {name} is controlled by another owner")]
    OwnershipConflict {
        /// Kind of the child object
        kind: &'static str,
        /// `namespace/name` of the child object
        name: String,
    },

    /// Reconcile attempt exceeded its deadline
    #[error("Reconcile of {0} timed out after {1:?}")]
    Timeout(String, Duration),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Probe server failed
    #[error("Probe server failed: {0}")]
    Probe(#[from] std::io::Error),
}
