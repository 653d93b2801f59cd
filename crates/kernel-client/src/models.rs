//! Jupyter kernel API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kernel is waiting for input
pub const EXECUTION_STATE_IDLE: &str = "idle";
/// Kernel is executing code
pub const EXECUTION_STATE_BUSY: &str = "busy";
/// Kernel process is still starting
pub const EXECUTION_STATE_STARTING: &str = "starting";

/// One entry of `GET /api/kernels`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KernelStatus {
    /// Kernel id
    pub id: String,
    /// Kernel spec name (e.g. `python3`)
    pub name: String,
    /// RFC3339 timestamp of the last message the kernel handled
    pub last_activity: String,
    /// `idle`, `busy`, `starting`, ...
    pub execution_state: String,
    /// Number of connected clients
    #[serde(default)]
    pub connections: i64,
}

impl KernelStatus {
    /// True when the kernel reports the `idle` execution state
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.execution_state == EXECUTION_STATE_IDLE
    }

    /// Parsed `last_activity`, `None` when the server sent garbage
    #[must_use]
    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.last_activity)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// A server with no kernels counts as idle.
#[must_use]
pub fn all_idle(kernels: &[KernelStatus]) -> bool {
    kernels.iter().all(KernelStatus::is_idle)
}

/// Latest parseable activity across all kernels.
#[must_use]
pub fn latest_activity(kernels: &[KernelStatus]) -> Option<DateTime<Utc>> {
    kernels.iter().filter_map(KernelStatus::last_activity_at).max()
}
