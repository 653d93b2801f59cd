//! Reconciliation logic for notebooks.
//!
//! Two loops share one `Reconciler`:
//! - `notebook`: desired-state loop (workload, service, status mirroring)
//! - `culler`: idle-culling loop (policy resolution, activity check, stop)
//!
//! Both are keyed by notebook identity and re-read everything they need from
//! the store on each invocation, so re-delivery is always safe.

pub mod culler;
pub mod notebook;
pub mod policy;


use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::store::ClusterStore;
use kernel_client::ActivityOracle;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 300), // 1 second min, 5 minutes max
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

/// Result of one successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Wake this key again after the given delay; `None` waits for a watch event
    pub requeue_after: Option<Duration>,
}

impl Outcome {
    /// Nothing scheduled
    #[must_use]
    pub fn done() -> Self {
        Self {
            requeue_after: None,
        }
    }

    /// Re-run after `delay`
    #[must_use]
    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay),
        }
    }

    /// Translate into the runtime's action
    #[must_use]
    pub fn into_action(self) -> Action {
        match self.requeue_after {
            Some(delay) => Action::requeue(delay),
            None => Action::await_change(),
        }
    }
}

/// Reconciles notebooks against the cluster.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ClusterStore>,
    pub(crate) oracle: Arc<dyn ActivityOracle>,
    pub(crate) config: ControllerConfig,
    /// Error count tracking per key (loop/namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        store: Arc<dyn ClusterStore>,
        oracle: Arc<dyn ActivityOracle>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `attempt` under the configured reconcile deadline.
    ///
    /// Dropping the future on expiry cancels every in-flight API and kernel
    /// request it owns.
    pub async fn with_deadline<F>(&self, key: &str, attempt: F) -> Result<Outcome, ControllerError>
    where
        F: Future<Output = Result<Outcome, ControllerError>>,
    {
        let deadline = self.config.reconcile_timeout;
        tokio::time::timeout(deadline, attempt)
            .await
            .map_err(|_elapsed| ControllerError::Timeout(key.to_string(), deadline))?
    }

    /// Get the Fibonacci backoff duration for a key based on its error count
    ///
    /// Returns (backoff, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(60), 0)
            }
        }
    }

    /// Increment error count for a key
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .increment_error();
        }
    }

    /// Forget the backoff state of a key (on successful reconciliation)
    ///
    /// Dropping the entry keeps the map bounded by the keys currently failing.
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.backoff_states.lock().map(|states| states.len()).unwrap_or(0)
    }
}
