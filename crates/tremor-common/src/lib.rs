//! Common types for tremor: CRDs, errors, events and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod crd_registry;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod metrics;
pub mod retry;
pub mod telemetry;

pub use crd_registry::{CrdKind, CrdRegistry};
pub use error::Error;

/// Field manager and event reporter name for the chaos controller
pub const CONTROLLER_NAME: &str = "tremor-chaos-controller";

/// Label marking resources created by tremor
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "tremor";

/// Label carrying the owning experiment's name
pub const EXPERIMENT_LABEL: &str = "tremor.dev/experiment";

/// Label carrying the requirement a job runs for
pub const REQUIREMENT_LABEL: &str = "tremor.dev/requirement";

/// Annotation holding the hash of the desired body, used for change detection
pub const SPEC_HASH_ANNOTATION: &str = "tremor.dev/spec-hash";
