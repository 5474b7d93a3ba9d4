//! NetworkChaos body

use serde::Serialize;

use tremor_common::crd::{
    CorruptParams, DelayParams, DuplicateParams, LossParams, NetworkChaosAction,
    NetworkChaosSpec, PodSelector,
};

use super::MODE_ALL;

#[derive(Debug, Serialize)]
pub(super) struct Target<'a> {
    mode: &'static str,
    selector: &'a PodSelector,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NetworkChaosBody<'a> {
    action: &'static str,
    mode: &'static str,
    selector: &'a PodSelector,
    direction: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<Target<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delay: Option<&'a DelayParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loss: Option<&'a LossParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duplicate: Option<&'a DuplicateParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    corrupt: Option<&'a CorruptParams>,
}

/// Only the parameter block matching the action is emitted
pub(super) fn chaos_mesh_spec(spec: &NetworkChaosSpec) -> NetworkChaosBody<'_> {
    let p = &spec.params;
    let mut body = NetworkChaosBody {
        action: "partition",
        mode: MODE_ALL,
        selector: &spec.selector,
        direction: spec.direction.as_str(),
        target: spec.target.as_ref().map(|selector| Target {
            mode: MODE_ALL,
            selector,
        }),
        duration: spec.duration.as_deref(),
        delay: None,
        loss: None,
        duplicate: None,
        corrupt: None,
    };
    match spec.action {
        NetworkChaosAction::Delay => {
            body.action = "delay";
            body.delay = p.delay.as_ref();
        }
        NetworkChaosAction::Loss => {
            body.action = "loss";
            body.loss = p.loss.as_ref();
        }
        NetworkChaosAction::Duplication => {
            body.action = "duplicate";
            body.duplicate = p.duplicate.as_ref();
        }
        NetworkChaosAction::Corruption => {
            body.action = "corrupt";
            body.corrupt = p.corrupt.as_ref();
        }
        NetworkChaosAction::Partition => {}
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use tremor_common::crd::{Direction, NetworkChaosParams};

    fn spec(action: NetworkChaosAction) -> NetworkChaosSpec {
        NetworkChaosSpec {
            selector: PodSelector {
                namespaces: vec!["shop".to_string()],
                ..Default::default()
            },
            target: None,
            action,
            duration: Some("1m".to_string()),
            direction: Direction::Both,
            params: NetworkChaosParams {
                delay: Some(DelayParams {
                    latency: "100ms".to_string(),
                    jitter: None,
                }),
                loss: Some(LossParams {
                    loss: "25".to_string(),
                }),
                duplicate: None,
                corrupt: None,
            },
        }
    }

    #[test]
    fn delay_emits_only_delay_block() {
        let body = serde_json::to_value(chaos_mesh_spec(&spec(NetworkChaosAction::Delay))).unwrap();
        assert_eq!(body["action"], "delay");
        assert_eq!(body["delay"]["latency"], "100ms");
        assert_eq!(body["direction"], "both");
        assert!(body.get("loss").is_none());
        assert!(body.get("target").is_none());
    }

    #[test]
    fn partition_with_target() {
        let mut s = spec(NetworkChaosAction::Partition);
        s.target = Some(PodSelector {
            namespaces: vec!["db".to_string()],
            ..Default::default()
        });
        let body = serde_json::to_value(chaos_mesh_spec(&s)).unwrap();
        assert_eq!(body["action"], "partition");
        assert_eq!(body["target"]["mode"], "all");
        assert_eq!(body["target"]["selector"]["namespaces"][0], "db");
        assert!(body.get("delay").is_none());
        assert!(body.get("loss").is_none());
    }
}
