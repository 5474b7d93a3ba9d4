//! Fault status to experiment condition

use tracing::debug;

use tremor_common::crd::{ChaosCondition, ChaosExperiment};

use super::FaultObject;

/// Map the live fault's conditions onto a [`ChaosCondition`].
///
/// A missing object or status is `Unknown`. Unselected targets win over
/// everything, then pause; injected and recovered are only reported when
/// they are not both set.
pub fn translate_condition(
    experiment: &ChaosExperiment,
    fault: Option<&FaultObject>,
) -> ChaosCondition {
    let Some(fault) = fault.filter(|f| f.status.is_some()) else {
        debug!(experiment = ?experiment.metadata.name, "fault has no status yet");
        return ChaosCondition::Unknown;
    };

    if !fault.condition_is_true("Selected") {
        return ChaosCondition::NoTarget;
    }
    if fault.condition_is_true("Paused") {
        return ChaosCondition::Paused;
    }
    match (
        fault.condition_is_true("AllInjected"),
        fault.condition_is_true("AllRecovered"),
    ) {
        (true, false) => ChaosCondition::AllInjected,
        (false, true) => ChaosCondition::AllRecovered,
        _ => ChaosCondition::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultCondition, FaultStatus};
    use tremor_common::crd::{ChaosExperimentSpec, Expect, InjectJobSpec};

    fn experiment() -> ChaosExperiment {
        ChaosExperiment::new(
            "exp",
            ChaosExperimentSpec {
                pod_chaos: None,
                network_chaos: None,
                inject_job: InjectJobSpec::default(),
                expect: Expect::default(),
            },
        )
    }

    fn fault(conditions: &[(&str, &str)]) -> FaultObject {
        FaultObject {
            kind: "PodChaos".to_string(),
            status: Some(FaultStatus {
                conditions: conditions
                    .iter()
                    .map(|(t, s)| FaultCondition {
                        type_: t.to_string(),
                        status: s.to_string(),
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn missing_fault_or_status_is_unknown() {
        let exp = experiment();
        assert_eq!(translate_condition(&exp, None), ChaosCondition::Unknown);
        let bare = FaultObject::default();
        assert_eq!(translate_condition(&exp, Some(&bare)), ChaosCondition::Unknown);
    }

    #[test]
    fn unselected_is_no_target() {
        let f = fault(&[("Selected", "False"), ("AllInjected", "True")]);
        assert_eq!(translate_condition(&experiment(), Some(&f)), ChaosCondition::NoTarget);
    }

    #[test]
    fn paused_beats_injected() {
        let f = fault(&[("Selected", "True"), ("Paused", "True"), ("AllInjected", "True")]);
        assert_eq!(translate_condition(&experiment(), Some(&f)), ChaosCondition::Paused);
    }

    #[test]
    fn injected_and_recovered() {
        let exp = experiment();
        let injected = fault(&[("Selected", "True"), ("AllInjected", "True"), ("AllRecovered", "False")]);
        assert_eq!(translate_condition(&exp, Some(&injected)), ChaosCondition::AllInjected);

        let recovered = fault(&[("Selected", "True"), ("AllInjected", "False"), ("AllRecovered", "True")]);
        assert_eq!(translate_condition(&exp, Some(&recovered)), ChaosCondition::AllRecovered);

        let both = fault(&[("Selected", "True"), ("AllInjected", "True"), ("AllRecovered", "True")]);
        assert_eq!(translate_condition(&exp, Some(&both)), ChaosCondition::Unknown);
    }
}
