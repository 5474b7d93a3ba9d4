//! Kubernetes Event recording for the chaos controller.
//!
//! Wraps `kube::runtime::events::Recorder` behind a trait so the reconciler can
//! emit Events visible via `kubectl describe chaos <name>` while tests swap in
//! a no-op or a mock.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "FaultCreated")
    /// * `action` - What action was taken (e.g. "Reconcile")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as the given controller name.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation for tests.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    // Fault object
    /// Chaos Mesh fault object created for the experiment
    pub const FAULT_CREATED: &str = "FaultCreated";
    /// Fault object re-armed after the embedded fault spec changed
    pub const FAULT_UPDATED: &str = "FaultUpdated";

    // Companion config
    /// Script ConfigMap created
    pub const CONFIG_CREATED: &str = "ConfigCreated";
    /// Script ConfigMap content replaced
    pub const CONFIG_UPDATED: &str = "ConfigUpdated";

    // Jobs
    /// Requirement job created
    pub const JOB_CREATED: &str = "JobCreated";
    /// Stale requirement job deleted so it can be recreated
    pub const JOB_REPLACED: &str = "JobReplaced";
    /// Requirement job reported failure
    pub const JOB_FAILED: &str = "JobFailed";
    /// Job could not be built from the experiment annotations
    pub const JOB_BUILD_FAILED: &str = "JobBuildFailed";

    // Lifecycle
    /// Experiment moved to the next phase
    pub const PHASE_ADVANCED: &str = "PhaseAdvanced";
    /// Verification output matched the expectation
    pub const VERIFY_SUCCEEDED: &str = "VerifySucceeded";
    /// Verification output did not match the expectation
    pub const VERIFY_FAILED: &str = "VerifyFailed";
    /// Spec validation failed
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    /// A reconcile step returned an error
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}

/// Well-known event action strings.
///
/// These appear in `kubectl get events` under the ACTION column.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Creating or updating the fault object
    pub const INJECT: &str = "Inject";
    /// Running a requirement job
    pub const RUN_JOB: &str = "RunJob";
    /// Comparing verification output
    pub const VERIFY: &str = "Verify";
}
