//! ActivityOracle trait for mocking
//!
//! The culling loop only depends on this trait. `JupyterKernelClient` is the
//! production implementation; `MockActivityOracle` (feature `test-util`)
//! gives deterministic answers for tests.

use crate::error::KernelClientError;
use chrono::{DateTime, Utc};

/// Kernel activity source for a notebook workload
#[async_trait::async_trait]
pub trait ActivityOracle: Send + Sync {
    /// True when the workload has no kernels or every kernel is idle
    async fn is_idle(&self, namespace: &str, name: &str) -> Result<bool, KernelClientError>;

    /// Most recent kernel activity, or `None` when nothing was ever recorded
    async fn last_activity(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DateTime<Utc>>, KernelClientError>;
}
