//! Fault translation layer
//!
//! Translates an experiment's embedded fault into a Chaos Mesh `PodChaos` or
//! `NetworkChaos` object, and reads the live object back for condition
//! translation. The variant set is closed: every translation is an
//! exhaustive match over [`EmbeddedFault`].

mod condition;
mod network;
mod pod;

pub use condition::translate_condition;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DynamicObject, PostParams, TypeMeta};
use kube::{Client, Resource, ResourceExt};
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use tremor_common::crd::{ChaosExperiment, EmbeddedFault};
use tremor_common::kube_utils::deterministic_hash;
use tremor_common::{
    CrdKind, CrdRegistry, EXPERIMENT_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
    SPEC_HASH_ANNOTATION,
};

use crate::error::ChaosError;

/// Selection mode written on every fault: all matching pods are affected
const MODE_ALL: &str = "all";

/// Which Chaos Mesh resource backs a fault
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    Pod,
    Network,
}

impl FaultKind {
    pub fn of(fault: EmbeddedFault<'_>) -> Self {
        match fault {
            EmbeddedFault::Pod(_) => Self::Pod,
            EmbeddedFault::Network(_) => Self::Network,
        }
    }

    pub fn crd_kind(&self) -> CrdKind {
        match self {
            Self::Pod => CrdKind::PodChaos,
            Self::Network => CrdKind::NetworkChaos,
        }
    }
}

// =============================================================================
// Fault object
// =============================================================================

/// Typed view of a Chaos Mesh object; the spec stays untyped because the
/// controller only writes it and never reads it back.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaultObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FaultStatus>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct FaultStatus {
    #[serde(default)]
    pub conditions: Vec<FaultCondition>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct FaultCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
}

impl FaultObject {
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self.kind.as_str() {
            "PodChaos" => Some(FaultKind::Pod),
            "NetworkChaos" => Some(FaultKind::Network),
            _ => None,
        }
    }

    /// Whether the named status condition is "True"
    pub fn condition_is_true(&self, type_: &str) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.conditions
                .iter()
                .any(|c| c.type_ == type_ && c.status == "True")
        })
    }
}

/// Build the fault object the experiment wants to exist.
///
/// Fails on an invalid spec before anything is written.
pub fn desired_fault(experiment: &ChaosExperiment) -> Result<FaultObject, ChaosError> {
    let name = experiment.name_any();
    let namespace = experiment
        .namespace()
        .ok_or(ChaosError::MissingNamespace)?;
    let fault = experiment.spec.validated_fault(&name)?;
    let kind = FaultKind::of(fault);

    let spec = match fault {
        EmbeddedFault::Pod(pod) => serde_json::to_value(pod::chaos_mesh_spec(pod))?,
        EmbeddedFault::Network(net) => serde_json::to_value(network::chaos_mesh_spec(net))?,
    };
    let hash = deterministic_hash(&serde_json::to_string(&spec)?);

    Ok(FaultObject {
        api_version: kind.crd_kind().hardcoded_api_version().to_string(),
        kind: kind.crd_kind().kind_str().to_string(),
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace),
            labels: Some(BTreeMap::from([
                (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
                (EXPERIMENT_LABEL.to_string(), name),
            ])),
            annotations: Some(BTreeMap::from([(SPEC_HASH_ANNOTATION.to_string(), hash)])),
            owner_references: experiment.controller_owner_ref(&()).map(|o| vec![o]),
            ..Default::default()
        },
        spec,
        status: None,
    })
}

/// Drift check by spec hash; a live object without the annotation counts as drifted
pub fn fault_changed(live: &FaultObject, desired: &FaultObject) -> bool {
    let hash = |f: &FaultObject| {
        f.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(SPEC_HASH_ANNOTATION))
            .cloned()
    };
    hash(live).is_none() || hash(live) != hash(desired)
}

/// Desired object carrying the live resourceVersion, ready for replace
pub fn prepare_update(live: &FaultObject, desired: &FaultObject) -> FaultObject {
    let mut update = desired.clone();
    update.metadata.resource_version = live.metadata.resource_version.clone();
    update.metadata.uid = live.metadata.uid.clone();
    update
}

// =============================================================================
// Client
// =============================================================================

/// Access to the fault-injection collaborator
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FaultClient: Send + Sync {
    /// Fetch the fault object; `None` when absent
    async fn get(
        &self,
        kind: FaultKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<FaultObject>, ChaosError>;

    async fn create(&self, fault: &FaultObject) -> Result<(), ChaosError>;

    /// Replace the object; `fault` must carry the live resourceVersion
    async fn update(&self, fault: &FaultObject) -> Result<(), ChaosError>;
}

/// Chaos Mesh client over dynamic objects resolved through the registry
pub struct KubeFaultClient {
    client: Client,
    registry: Arc<CrdRegistry>,
}

impl KubeFaultClient {
    pub fn new(client: Client, registry: Arc<CrdRegistry>) -> Self {
        Self { client, registry }
    }

    async fn api(
        &self,
        kind: FaultKind,
        namespace: &str,
    ) -> Result<(Api<DynamicObject>, TypeMeta), ChaosError> {
        let crd = kind.crd_kind();
        let ar = self
            .registry
            .resolve(crd)
            .await
            .ok_or(ChaosError::FaultCrdMissing(crd))?;
        let types = TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        };
        Ok((Api::namespaced_with(self.client.clone(), namespace, &ar), types))
    }

    /// Api handle plus the object converted for the dynamic client
    async fn api_for(
        &self,
        fault: &FaultObject,
    ) -> Result<(Api<DynamicObject>, DynamicObject), ChaosError> {
        let kind = fault.fault_kind().ok_or_else(|| {
            tremor_common::Error::serialization_for_kind(&fault.kind, "unsupported fault kind")
        })?;
        let namespace = fault
            .metadata
            .namespace
            .as_deref()
            .ok_or(ChaosError::MissingNamespace)?;
        let (api, types) = self.api(kind, namespace).await?;
        let mut obj: DynamicObject = serde_json::from_value(serde_json::to_value(fault)?)?;
        obj.types = Some(types);
        Ok((api, obj))
    }
}

#[async_trait]
impl FaultClient for KubeFaultClient {
    async fn get(
        &self,
        kind: FaultKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<FaultObject>, ChaosError> {
        let (api, _) = self.api(kind, namespace).await?;
        match api.get_opt(name).await? {
            Some(obj) => Ok(Some(serde_json::from_value(serde_json::to_value(&obj)?)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, fault: &FaultObject) -> Result<(), ChaosError> {
        let (api, obj) = self.api_for(fault).await?;
        api.create(&PostParams::default(), &obj).await?;
        Ok(())
    }

    async fn update(&self, fault: &FaultObject) -> Result<(), ChaosError> {
        let (api, obj) = self.api_for(fault).await?;
        api.replace(&obj.name_any(), &PostParams::default(), &obj)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tremor_common::crd::{
        ChaosExperimentSpec, ContainerKillParams, Expect, InjectJobSpec, PodChaosAction,
        PodChaosParams, PodChaosSpec, PodSelector,
    };

    fn experiment(action: PodChaosAction, names: &[&str]) -> ChaosExperiment {
        let mut exp = ChaosExperiment::new(
            "kill-proxy",
            ChaosExperimentSpec {
                pod_chaos: Some(PodChaosSpec {
                    selector: PodSelector {
                        namespaces: vec!["shop".to_string()],
                        ..Default::default()
                    },
                    action,
                    params: PodChaosParams {
                        pod_failure: None,
                        container_kill: Some(ContainerKillParams {
                            container_names: names.iter().map(|s| s.to_string()).collect(),
                        }),
                    },
                }),
                network_chaos: None,
                inject_job: InjectJobSpec::default(),
                expect: Expect::default(),
            },
        );
        exp.metadata.namespace = Some("chaos".to_string());
        exp.metadata.uid = Some("uid-3".to_string());
        exp
    }

    #[test]
    fn desired_pod_fault_identity() {
        let fault = desired_fault(&experiment(PodChaosAction::ContainerKill, &["proxy"])).unwrap();
        assert_eq!(fault.kind, "PodChaos");
        assert_eq!(fault.api_version, "chaos-mesh.org/v1alpha1");
        assert_eq!(fault.metadata.name.as_deref(), Some("kill-proxy"));
        assert_eq!(fault.metadata.namespace.as_deref(), Some("chaos"));
        assert_eq!(fault.spec["action"], "container-kill");
        assert_eq!(fault.spec["mode"], "all");
        assert_eq!(fault.spec["containerNames"][0], "proxy");
        assert!(fault.metadata.owner_references.is_some());
        assert_eq!(fault.fault_kind(), Some(FaultKind::Pod));
    }

    #[test]
    fn invalid_fault_is_rejected_before_write() {
        let err = desired_fault(&experiment(PodChaosAction::ContainerKill, &[])).unwrap_err();
        assert!(matches!(err, ChaosError::Common(_)));
    }

    #[test]
    fn change_detection_uses_spec_hash() {
        let a = desired_fault(&experiment(PodChaosAction::ContainerKill, &["proxy"])).unwrap();
        let b = desired_fault(&experiment(PodChaosAction::ContainerKill, &["proxy"])).unwrap();
        assert!(!fault_changed(&a, &b));

        let c = desired_fault(&experiment(PodChaosAction::ContainerKill, &["db"])).unwrap();
        assert!(fault_changed(&a, &c));

        let mut unannotated = a.clone();
        unannotated.metadata.annotations = None;
        assert!(fault_changed(&unannotated, &a));
    }

    #[test]
    fn update_carries_live_resource_version() {
        let mut live = desired_fault(&experiment(PodChaosAction::PodFailure, &[])).unwrap();
        live.metadata.resource_version = Some("77".to_string());
        let desired = desired_fault(&experiment(PodChaosAction::ContainerKill, &["x"])).unwrap();
        let update = prepare_update(&live, &desired);
        assert_eq!(update.metadata.resource_version.as_deref(), Some("77"));
        assert_eq!(update.spec, desired.spec);
    }

    #[test]
    fn fault_object_roundtrips_from_dynamic_json() {
        let json = serde_json::json!({
            "apiVersion": "chaos-mesh.org/v1alpha1",
            "kind": "NetworkChaos",
            "metadata": {"name": "x", "namespace": "chaos"},
            "spec": {"action": "partition"},
            "status": {"conditions": [{"type": "Selected", "status": "True"}]}
        });
        let fault: FaultObject = serde_json::from_value(json).unwrap();
        assert_eq!(fault.fault_kind(), Some(FaultKind::Network));
        assert!(fault.condition_is_true("Selected"));
        assert!(!fault.condition_is_true("Paused"));
    }
}
