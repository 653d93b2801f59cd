//! Jupyter kernel API client
//!
//! Polls `GET /notebook/<namespace>/<name>/api/kernels` on the notebook's
//! in-cluster service.

use crate::error::KernelClientError;
use crate::models::{KernelStatus, all_idle, latest_activity};
use crate::oracle_trait::ActivityOracle;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// HTTP implementation of [`ActivityOracle`]
#[derive(Debug, Clone)]
pub struct JupyterKernelClient {
    client: Client,
    endpoint_base: Option<String>,
}

impl JupyterKernelClient {
    /// Create a client whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Fails when the underlying HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, KernelClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint_base: None,
        })
    }

    /// Route every request to `base` instead of the per-notebook service DNS
    /// name (useful when running outside the cluster through a proxy).
    #[must_use]
    pub fn with_endpoint_base(mut self, base: impl Into<String>) -> Self {
        self.endpoint_base = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    /// Kernel listing URL for a notebook
    #[must_use]
    pub fn kernels_url(&self, namespace: &str, name: &str) -> String {
        let path = format!("/notebook/{namespace}/{name}/api/kernels");
        match &self.endpoint_base {
            Some(base) => format!("{base}{path}"),
            None => format!("http://{name}.{namespace}.svc.cluster.local{path}"),
        }
    }

    /// Fetch the raw kernel listing
    ///
    /// # Errors
    ///
    /// Transport failures, non-200 responses and undecodable bodies.
    pub async fn list_kernels(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<KernelStatus>, KernelClientError> {
        let url = self.kernels_url(namespace, name);
        debug!("Querying kernels for {}/{} at {}", namespace, name, url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(KernelClientError::Status(status.to_string()));
        }

        let body = response.bytes().await?;
        let kernels: Vec<KernelStatus> = serde_json::from_slice(&body)?;
        debug!("{}/{} has {} kernel(s)", namespace, name, kernels.len());
        Ok(kernels)
    }
}

#[async_trait::async_trait]
impl ActivityOracle for JupyterKernelClient {
    async fn is_idle(&self, namespace: &str, name: &str) -> Result<bool, KernelClientError> {
        let kernels = self.list_kernels(namespace, name).await?;
        Ok(all_idle(&kernels))
    }

    async fn last_activity(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DateTime<Utc>>, KernelClientError> {
        let kernels = self.list_kernels(namespace, name).await?;
        Ok(latest_activity(&kernels))
    }
}
