//! ChaosExperiment CRD types
//!
//! A `ChaosExperiment` declares one fault (pod or network), the scripts to run
//! before, during and after it, and the output the verification script is
//! expected to print.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::fault::{NetworkChaosSpec, PodChaosSpec};
use crate::Error;

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a ChaosExperiment
///
/// Progression: BeforeExperiment → AfterExperiment → InjectedChaos →
/// RecoveredChaos. A phase may stall but never skips ahead.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ChaosPhase {
    /// Experimental job has not completed yet
    #[default]
    BeforeExperiment,
    /// Experimental job completed, waiting for the fault to inject
    AfterExperiment,
    /// Fault confirmed injected, pressure job running
    InjectedChaos,
    /// Fault confirmed recovered, verification runs here
    RecoveredChaos,
}

impl std::fmt::Display for ChaosPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeforeExperiment => write!(f, "BeforeExperiment"),
            Self::AfterExperiment => write!(f, "AfterExperiment"),
            Self::InjectedChaos => write!(f, "InjectedChaos"),
            Self::RecoveredChaos => write!(f, "RecoveredChaos"),
        }
    }
}

// =============================================================================
// Condition
// =============================================================================

/// Coarse state of the live fault object
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ChaosCondition {
    /// Fault applied to every selected target
    AllInjected,
    /// Fault removed from every selected target
    AllRecovered,
    /// Fault paused by the operator of the fault engine
    Paused,
    /// Selector matched nothing
    NoTarget,
    /// Not observable yet, or mixed state
    #[default]
    Unknown,
}

impl std::fmt::Display for ChaosCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllInjected => write!(f, "AllInjected"),
            Self::AllRecovered => write!(f, "AllRecovered"),
            Self::Paused => write!(f, "Paused"),
            Self::NoTarget => write!(f, "NoTarget"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

// =============================================================================
// Spec
// =============================================================================

/// Scripts run by the requirement jobs
///
/// Each script runs as `sh -c <script>`. A missing script falls back to the
/// built-in workload.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InjectJobSpec {
    /// Container image for all requirement jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Runs before the fault is injected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<String>,

    /// Runs while the fault is injected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<String>,

    /// Runs after recovery; its output is compared with `expect.verify`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
}

/// Expected outcomes
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Expect {
    /// Expected log output of the verify job; empty accepts any output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
}

/// Borrowed view of the single embedded fault
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EmbeddedFault<'a> {
    /// Pod-level fault
    Pod(&'a PodChaosSpec),
    /// Network-level fault
    Network(&'a NetworkChaosSpec),
}

/// Chaos experiment specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tremor.dev",
    version = "v1alpha1",
    kind = "ChaosExperiment",
    plural = "chaosexperiments",
    shortname = "chaos",
    namespaced,
    status = "ChaosExperimentStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Condition","type":"string","jsonPath":".status.condition"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentSpec {
    /// Pod fault (exclusive with `networkChaos`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_chaos: Option<PodChaosSpec>,

    /// Network fault (exclusive with `podChaos`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_chaos: Option<NetworkChaosSpec>,

    /// Requirement job scripts
    #[serde(default)]
    pub inject_job: InjectJobSpec,

    /// Expected outcomes
    #[serde(default)]
    pub expect: Expect,
}

impl ChaosExperimentSpec {
    /// Validate the spec and return the embedded fault.
    ///
    /// Exactly one fault variant must be set and its action parameters must
    /// be complete.
    pub fn validated_fault(&self, experiment: &str) -> Result<EmbeddedFault<'_>, Error> {
        match (&self.pod_chaos, &self.network_chaos) {
            (Some(pod), None) => {
                pod.validate(experiment)?;
                Ok(EmbeddedFault::Pod(pod))
            }
            (None, Some(network)) => {
                network.validate(experiment)?;
                Ok(EmbeddedFault::Network(network))
            }
            (Some(_), Some(_)) => Err(Error::validation_for_field(
                experiment,
                "spec",
                "podChaos and networkChaos are mutually exclusive",
            )),
            (None, None) => Err(Error::validation_for_field(
                experiment,
                "spec",
                "one of podChaos or networkChaos must be set",
            )),
        }
    }

    /// Expected verify output, treating an absent value as empty
    pub fn expected_verify(&self) -> &str {
        self.expect.verify.as_deref().unwrap_or_default()
    }
}

// =============================================================================
// Status
// =============================================================================

/// When and why a check result was recorded
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResultDetail {
    /// When the result was recorded
    pub time: DateTime<Utc>,
    /// `"<Check>: <text>"`
    pub message: String,
}

/// Outcome of one named check
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ChaosResult {
    /// Whether the check passed
    pub success: bool,
    /// Timestamp and message
    pub detail: ResultDetail,
}

impl ChaosResult {
    /// Build a result whose message is prefixed with the check name
    pub fn new(check: &str, success: bool, text: impl AsRef<str>) -> Self {
        Self {
            success,
            detail: ResultDetail {
                time: Utc::now(),
                message: format!("{}: {}", check, text.as_ref()),
            },
        }
    }

    /// Whether this result belongs to `check`
    pub fn is_check(&self, check: &str) -> bool {
        self.detail
            .message
            .strip_prefix(check)
            .is_some_and(|rest| rest.starts_with(':'))
    }
}

/// ChaosExperiment status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentStatus {
    /// Lifecycle phase; absent means BeforeExperiment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ChaosPhase>,

    /// Live fault condition
    #[serde(default)]
    pub condition: ChaosCondition,

    /// At most one result per check name
    #[serde(default)]
    pub results: Vec<ChaosResult>,
}

impl ChaosExperiment {
    /// Current phase, treating an absent status as BeforeExperiment
    pub fn phase(&self) -> ChaosPhase {
        self.status
            .as_ref()
            .and_then(|s| s.phase)
            .unwrap_or_default()
    }
}
