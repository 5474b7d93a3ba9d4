//! Embedded fault descriptions
//!
//! A `ChaosExperiment` carries exactly one of these; the chaos controller
//! translates it into the matching Chaos Mesh resource.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

// =============================================================================
// Target Selection
// =============================================================================

/// Selects the pods a fault applies to
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSelector {
    /// Namespaces to select pods from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    /// Pod labels that must all match
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub label_selectors: BTreeMap<String, String>,

    /// Pod annotations that must all match
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotation_selectors: BTreeMap<String, String>,

    /// Node names the pods must run on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,

    /// Explicit pods, keyed by namespace
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pods: BTreeMap<String, Vec<String>>,

    /// Node labels that must all match
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selectors: BTreeMap<String, String>,

    /// Set-based label requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression_selectors: Vec<SelectorRequirement>,
}

/// A set-based label requirement (`key In (a, b)`)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SelectorRequirement {
    /// Label key
    pub key: String,
    /// One of In, NotIn, Exists, DoesNotExist
    pub operator: String,
    /// Values for In/NotIn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

// =============================================================================
// Pod Chaos
// =============================================================================

/// Pod-level disruption
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PodChaosAction {
    /// Make the selected pods unavailable for a while
    PodFailure,
    /// Kill named containers inside the selected pods
    ContainerKill,
}

/// Pod fault description
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodChaosSpec {
    /// Target pods
    #[serde(default)]
    pub selector: PodSelector,

    /// Disruption to apply
    pub action: PodChaosAction,

    /// Action-specific parameters
    #[serde(default)]
    pub params: PodChaosParams,
}

/// Parameters for pod actions; only the block matching the action is read
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodChaosParams {
    /// PodFailure parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_failure: Option<PodFailureParams>,

    /// ContainerKill parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_kill: Option<ContainerKillParams>,
}

/// PodFailure parameters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PodFailureParams {
    /// How long the failure lasts (e.g. "30s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// ContainerKill parameters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerKillParams {
    /// Containers to kill
    #[serde(default)]
    pub container_names: Vec<String>,
}

impl PodChaosSpec {
    /// Check that the parameters required by the action are present
    pub fn validate(&self, experiment: &str) -> Result<(), Error> {
        if self.action == PodChaosAction::ContainerKill {
            let names = self
                .params
                .container_kill
                .as_ref()
                .map(|p| p.container_names.as_slice())
                .unwrap_or_default();
            if names.is_empty() {
                return Err(Error::validation_for_field(
                    experiment,
                    "spec.podChaos.params.containerKill.containerNames",
                    "ContainerKill requires at least one container name",
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Network Chaos
// =============================================================================

/// Network-level disruption
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NetworkChaosAction {
    /// Add latency
    Delay,
    /// Drop packets
    Loss,
    /// Duplicate packets
    Duplication,
    /// Corrupt packets
    Corruption,
    /// Cut traffic between source and target
    Partition,
}

/// Traffic direction relative to the source pods
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Outbound from source
    #[default]
    To,
    /// Inbound to source
    From,
    /// Both directions
    Both,
}

impl Direction {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::To => "to",
            Self::From => "from",
            Self::Both => "both",
        }
    }
}

/// Network fault description
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkChaosSpec {
    /// Source pods
    #[serde(default)]
    pub selector: PodSelector,

    /// Optional peer pods; without it the fault applies to all traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PodSelector>,

    /// Disruption to apply
    pub action: NetworkChaosAction,

    /// How long the fault lasts (e.g. "1m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Traffic direction
    #[serde(default)]
    pub direction: Direction,

    /// Action-specific parameters
    #[serde(default)]
    pub params: NetworkChaosParams,
}

/// Parameters for network actions; only the block matching the action is read
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct NetworkChaosParams {
    /// Delay parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelayParams>,

    /// Loss parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<LossParams>,

    /// Duplication parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<DuplicateParams>,

    /// Corruption parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrupt: Option<CorruptParams>,
}

/// Delay parameters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct DelayParams {
    /// Added latency (e.g. "100ms")
    #[serde(default)]
    pub latency: String,
    /// Latency jitter (e.g. "10ms")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<String>,
}

/// Loss parameters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct LossParams {
    /// Loss percentage (e.g. "25")
    #[serde(default)]
    pub loss: String,
}

/// Duplication parameters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct DuplicateParams {
    /// Duplication percentage
    #[serde(default)]
    pub duplicate: String,
}

/// Corruption parameters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct CorruptParams {
    /// Corruption percentage
    #[serde(default)]
    pub corrupt: String,
}

impl NetworkChaosSpec {
    /// Check that the parameters required by the action are present
    pub fn validate(&self, experiment: &str) -> Result<(), Error> {
        let p = &self.params;
        let (present, field) = match self.action {
            NetworkChaosAction::Delay => (
                p.delay.as_ref().is_some_and(|d| !d.latency.is_empty()),
                "delay.latency",
            ),
            NetworkChaosAction::Loss => (
                p.loss.as_ref().is_some_and(|l| !l.loss.is_empty()),
                "loss.loss",
            ),
            NetworkChaosAction::Duplication => (
                p.duplicate.as_ref().is_some_and(|d| !d.duplicate.is_empty()),
                "duplicate.duplicate",
            ),
            NetworkChaosAction::Corruption => (
                p.corrupt.as_ref().is_some_and(|c| !c.corrupt.is_empty()),
                "corrupt.corrupt",
            ),
            NetworkChaosAction::Partition => (true, ""),
        };
        if !present {
            return Err(Error::validation_for_field(
                experiment,
                format!("spec.networkChaos.params.{}", field),
                format!("{:?} requires params.{}", self.action, field),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(action: NetworkChaosAction, params: NetworkChaosParams) -> NetworkChaosSpec {
        NetworkChaosSpec {
            selector: PodSelector::default(),
            target: None,
            action,
            duration: None,
            direction: Direction::default(),
            params,
        }
    }

    #[test]
    fn container_kill_requires_names() {
        let mut spec = PodChaosSpec {
            selector: PodSelector::default(),
            action: PodChaosAction::ContainerKill,
            params: PodChaosParams::default(),
        };
        assert!(spec.validate("exp").is_err());

        spec.params.container_kill = Some(ContainerKillParams {
            container_names: vec!["proxy".to_string()],
        });
        assert!(spec.validate("exp").is_ok());
    }

    #[test]
    fn pod_failure_needs_no_params() {
        let spec = PodChaosSpec {
            selector: PodSelector::default(),
            action: PodChaosAction::PodFailure,
            params: PodChaosParams::default(),
        };
        assert!(spec.validate("exp").is_ok());
    }

    #[test]
    fn delay_requires_latency() {
        let err = network(NetworkChaosAction::Delay, NetworkChaosParams::default())
            .validate("exp")
            .unwrap_err();
        assert!(err.to_string().contains("delay.latency"));

        let ok = network(
            NetworkChaosAction::Delay,
            NetworkChaosParams {
                delay: Some(DelayParams {
                    latency: "100ms".to_string(),
                    jitter: None,
                }),
                ..Default::default()
            },
        );
        assert!(ok.validate("exp").is_ok());
    }

    #[test]
    fn partition_needs_no_params() {
        assert!(network(NetworkChaosAction::Partition, NetworkChaosParams::default())
            .validate("exp")
            .is_ok());
    }

    #[test]
    fn direction_defaults_to_outbound() {
        let spec: NetworkChaosSpec =
            serde_json::from_str(r#"{"action":"Partition"}"#).unwrap();
        assert_eq!(spec.direction, Direction::To);
        let spec: NetworkChaosSpec =
            serde_json::from_str(r#"{"action":"Loss","direction":"both"}"#).unwrap();
        assert_eq!(spec.direction.as_str(), "both");
    }
}
