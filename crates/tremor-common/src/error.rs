//! Error types shared by the tremor crates
//!
//! Errors are structured with fields to aid debugging in production. Variants
//! carry the experiment name or the context where the failure happened, and
//! expose the Kubernetes API status categories the reconciler branches on
//! (not-found, conflict, already-exists).

use thiserror::Error;

/// Main error type for tremor operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a ChaosExperiment spec
    #[error("validation error for {experiment}: {message}")]
    Validation {
        /// Name of the experiment with invalid configuration
        experiment: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.networkChaos.params.delay")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "status", "create_client")
        context: String,
    },
}

impl Error {
    /// Create a validation error with experiment context and field path
    pub fn validation_for_field(
        experiment: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            experiment: experiment.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors are not retryable (require a spec fix).
    /// Conflicts are retryable with a fresh read; other 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                is_conflict(source)
                    || !matches!(
                        source,
                        kube::Error::Api(ae) if (400..500).contains(&ae.code)
                    )
            }
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// True when the API server answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source } if is_not_found(source))
    }

    /// True when an update lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source } if is_conflict(source))
    }

    /// True when a create raced another writer
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Kube { source } if is_already_exists(source))
    }
}

/// Check a raw kube error for HTTP 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Check a raw kube error for an HTTP 409 caused by a stale resourceVersion
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "Conflict")
}

/// Check a raw kube error for an HTTP 409 caused by a duplicate create
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} from test", reason),
            reason: reason.to_string(),
            code,
        })
    }

    // ==========================================================================
    // Story Tests: Error Categories During Experiment Reconciliation
    // ==========================================================================
    //
    // The reconciler treats each API outcome differently: a missing object
    // needs creating, a conflict is retried with a fresh read, a duplicate
    // create is swallowed and a broken spec is surfaced to the user.

    /// Story: a missing sub-resource is reported as not-found, not fatal
    #[test]
    fn story_missing_resource_is_not_found() {
        let err = Error::from(api_error(404, "NotFound"));
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
        assert!(!err.is_retryable());
    }

    /// Story: concurrent status writers collide and the loser retries
    #[test]
    fn story_status_conflict_is_retryable() {
        let err = Error::from(api_error(409, "Conflict"));
        assert!(err.is_conflict());
        assert!(!err.is_already_exists());
        assert!(err.is_retryable());
    }

    /// Story: two passes racing on create both see success
    #[test]
    fn story_duplicate_create_is_already_exists() {
        let err = Error::from(api_error(409, "AlreadyExists"));
        assert!(err.is_already_exists());
        assert!(!err.is_conflict());
    }

    /// Story: a broken spec is never retried until the user edits it
    #[test]
    fn story_validation_names_experiment_and_field() {
        let err = Error::validation_for_field(
            "kill-db",
            "spec.podChaos.params.containerKill",
            "containerNames must not be empty",
        );
        assert!(err.to_string().contains("kill-db"));
        match &err {
            Error::Validation {
                experiment, field, ..
            } => {
                assert_eq!(experiment, "kill-db");
                assert_eq!(field.as_deref(), Some("spec.podChaos.params.containerKill"));
            }
            _ => panic!("Expected Validation variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(Error::from(api_error(500, "InternalError")).is_retryable());
        assert!(Error::internal_with_context("create_client", "connection reset").is_retryable());
        assert!(!Error::serialization_for_kind("PodChaos", "bad json").is_retryable());
    }

    #[test]
    fn internal_error_names_its_context() {
        let err = Error::internal_with_context("telemetry", "failed to install subscriber");
        assert!(err.to_string().contains("[telemetry]"));
        match err {
            Error::Internal { context, .. } => assert_eq!(context, "telemetry"),
            _ => panic!("Expected Internal variant"),
        }
    }

    #[test]
    fn serialization_error_keeps_kind() {
        match Error::serialization_for_kind("NetworkChaos", "unsupported fault kind") {
            Error::Serialization { kind, message } => {
                assert_eq!(kind.as_deref(), Some("NetworkChaos"));
                assert_eq!(message, "unsupported fault kind");
            }
            _ => panic!("Expected Serialization variant"),
        }
    }
}
