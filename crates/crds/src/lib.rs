//! Notebook Controller CRD Definitions
//!
//! Kubernetes Custom Resource Definitions shared by the notebook control loops,
//! plus the annotation/label protocol the loops use to coordinate.

pub mod annotations;
pub mod culling_policy;
pub mod duration;
pub mod error;
pub mod notebook;

pub use annotations::*;
pub use culling_policy::*;
pub use duration::parse_duration;
pub use error::CrdError;
pub use notebook::*;

/// Schema for embedded Kubernetes types (pod specs, container states).
///
/// The API server validates these on the owned objects, so the CRD only
/// needs to keep the fields from being pruned.
pub(crate) fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
