//! Kernel client errors

use thiserror::Error;

/// Errors that can occur when querying a notebook server's kernels
#[derive(Debug, Error)]
pub enum KernelClientError {
    /// HTTP request/response error (connect failure, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The notebook server answered with a non-200 status
    #[error("kernel API returned {0}")]
    Status(String),

    /// Response body was not a kernel list
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
