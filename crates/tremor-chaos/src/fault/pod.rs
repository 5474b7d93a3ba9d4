//! PodChaos body

use serde::Serialize;

use tremor_common::crd::{PodChaosAction, PodChaosSpec, PodSelector};

use super::MODE_ALL;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PodChaosBody<'a> {
    action: &'static str,
    mode: &'static str,
    selector: &'a PodSelector,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    container_names: Vec<&'a str>,
}

pub(super) fn chaos_mesh_spec(spec: &PodChaosSpec) -> PodChaosBody<'_> {
    let (action, duration, container_names) = match spec.action {
        PodChaosAction::PodFailure => (
            "pod-failure",
            spec.params
                .pod_failure
                .as_ref()
                .and_then(|p| p.duration.as_deref()),
            Vec::new(),
        ),
        PodChaosAction::ContainerKill => (
            "container-kill",
            None,
            spec.params
                .container_kill
                .iter()
                .flat_map(|p| p.container_names.iter().map(String::as_str))
                .collect(),
        ),
    };
    PodChaosBody {
        action,
        mode: MODE_ALL,
        selector: &spec.selector,
        duration,
        container_names,
    }
}
