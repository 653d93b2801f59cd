//! CRD validation errors

use thiserror::Error;

/// Errors raised while validating or interpreting CRD contents
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrdError {
    /// Duration string does not follow the `<number><unit>` grammar
    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    /// Duration string parsed to a negative value
    #[error("negative duration {0:?}")]
    NegativeDuration(String),

    /// Cluster-scope culling policy with a name other than `default`
    #[error("culling policy {namespace}/{name}: metadata.name must be 'default'")]
    InvalidPolicyName {
        /// Namespace of the rejected policy
        namespace: String,
        /// Name of the rejected policy
        name: String,
    },
}
