//! Chaos-controller error types

use tremor_common::CrdKind;

#[derive(Debug, thiserror::Error)]
pub enum ChaosError {
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Common(#[from] tremor_common::Error),

    #[error("invalid value '{value}' for annotation {key}: {reason}")]
    InvalidOverride {
        key: String,
        value: String,
        reason: String,
    },

    #[error("missing namespace on ChaosExperiment")]
    MissingNamespace,

    #[error("fault CRD {} ({}) not available", .0.kind_str(), .0.group())]
    FaultCrdMissing(CrdKind),

    #[error("no pods appeared for job {job}")]
    NoPodsForJob { job: String },

    #[error("status update for {experiment} did not resolve: {message}")]
    StatusConflict { experiment: String, message: String },

    /// Raised when the fault object had to be re-armed. The orchestrator
    /// turns this into a short requeue instead of surfacing it.
    #[error("fault spec changed")]
    SpecChanged,
}

impl ChaosError {
    /// True for HTTP 404 from any wrapped kube error
    pub fn is_not_found(&self) -> bool {
        match self {
            ChaosError::Kube(e) => tremor_common::error::is_not_found(e),
            ChaosError::Common(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// True for an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            ChaosError::Kube(e) => tremor_common::error::is_conflict(e),
            ChaosError::Common(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// True when a create lost a race to another writer
    pub fn is_already_exists(&self) -> bool {
        match self {
            ChaosError::Kube(e) => tremor_common::error::is_already_exists(e),
            ChaosError::Common(e) => e.is_already_exists(),
            _ => false,
        }
    }

    /// Metric label: whether retrying without a spec change can help
    pub fn error_type(&self) -> &'static str {
        match self {
            ChaosError::InvalidOverride { .. } | ChaosError::Serialization(_) => "permanent",
            ChaosError::Common(e) if !e.is_retryable() => "permanent",
            _ => "transient",
        }
    }
}
