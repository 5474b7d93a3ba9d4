//! Phase state machine
//!
//! Pure functions deciding which requirement job should run for a phase, and
//! which phase comes next given the job outcome and the fault condition.

use tremor_common::crd::{ChaosCondition, ChaosPhase};

/// Which job payload is currently relevant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InjectRequirement {
    /// Baseline workload before the fault
    Experimental,
    /// Workload run while the fault is injected
    Pressure,
    /// Verification after recovery
    Verify,
}

/// Every requirement, in lifecycle order
pub const ALL_REQUIREMENTS: [InjectRequirement; 3] = [
    InjectRequirement::Experimental,
    InjectRequirement::Pressure,
    InjectRequirement::Verify,
];

impl InjectRequirement {
    /// Lowercase tag used in job names, labels and config keys
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Experimental => "experimental",
            Self::Pressure => "pressure",
            Self::Verify => "verify",
        }
    }

    /// Check name used as the result message prefix
    pub fn check_name(&self) -> &'static str {
        match self {
            Self::Experimental => "Experimental",
            Self::Pressure => "Pressure",
            Self::Verify => "Verify",
        }
    }
}

impl std::fmt::Display for InjectRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.check_name())
    }
}

/// Requirement for a phase; `None` is treated as BeforeExperiment.
pub fn next_requirement(phase: Option<ChaosPhase>) -> InjectRequirement {
    match phase.unwrap_or_default() {
        ChaosPhase::BeforeExperiment | ChaosPhase::AfterExperiment => {
            InjectRequirement::Experimental
        }
        ChaosPhase::InjectedChaos => InjectRequirement::Pressure,
        ChaosPhase::RecoveredChaos => InjectRequirement::Verify,
    }
}

/// Single-step transition.
///
/// Only three edges exist; everything else stalls. `Unknown`, `NoTarget`
/// and `Paused` never satisfy an edge that depends on the condition.
pub fn advance(phase: ChaosPhase, job_succeeded: bool, condition: ChaosCondition) -> ChaosPhase {
    match (phase, condition) {
        (ChaosPhase::BeforeExperiment, _) if job_succeeded => ChaosPhase::AfterExperiment,
        (ChaosPhase::AfterExperiment, ChaosCondition::AllInjected) => ChaosPhase::InjectedChaos,
        (ChaosPhase::InjectedChaos, ChaosCondition::AllRecovered) => ChaosPhase::RecoveredChaos,
        (current, _) => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHASES: [ChaosPhase; 4] = [
        ChaosPhase::BeforeExperiment,
        ChaosPhase::AfterExperiment,
        ChaosPhase::InjectedChaos,
        ChaosPhase::RecoveredChaos,
    ];

    const CONDITIONS: [ChaosCondition; 5] = [
        ChaosCondition::AllInjected,
        ChaosCondition::AllRecovered,
        ChaosCondition::Paused,
        ChaosCondition::NoTarget,
        ChaosCondition::Unknown,
    ];

    #[test]
    fn next_requirement_covers_every_phase() {
        assert_eq!(next_requirement(None), InjectRequirement::Experimental);
        assert_eq!(
            next_requirement(Some(ChaosPhase::BeforeExperiment)),
            InjectRequirement::Experimental
        );
        assert_eq!(
            next_requirement(Some(ChaosPhase::AfterExperiment)),
            InjectRequirement::Experimental
        );
        assert_eq!(
            next_requirement(Some(ChaosPhase::InjectedChaos)),
            InjectRequirement::Pressure
        );
        assert_eq!(
            next_requirement(Some(ChaosPhase::RecoveredChaos)),
            InjectRequirement::Verify
        );
    }

    #[test]
    fn lifecycle_edges() {
        assert_eq!(
            advance(ChaosPhase::BeforeExperiment, true, ChaosCondition::Unknown),
            ChaosPhase::AfterExperiment
        );
        assert_eq!(
            advance(ChaosPhase::AfterExperiment, false, ChaosCondition::AllInjected),
            ChaosPhase::InjectedChaos
        );
        assert_eq!(
            advance(ChaosPhase::InjectedChaos, false, ChaosCondition::AllRecovered),
            ChaosPhase::RecoveredChaos
        );
    }

    #[test]
    fn advance_moves_at_most_one_step() {
        // AllInjected must not carry BeforeExperiment past AfterExperiment
        assert_eq!(
            advance(ChaosPhase::BeforeExperiment, true, ChaosCondition::AllInjected),
            ChaosPhase::AfterExperiment
        );
        assert_eq!(
            advance(ChaosPhase::AfterExperiment, true, ChaosCondition::AllRecovered),
            ChaosPhase::AfterExperiment
        );
    }

    #[test]
    fn ambiguous_conditions_freeze_the_phase() {
        for phase in [
            ChaosPhase::AfterExperiment,
            ChaosPhase::InjectedChaos,
            ChaosPhase::RecoveredChaos,
        ] {
            for condition in [
                ChaosCondition::Unknown,
                ChaosCondition::NoTarget,
                ChaosCondition::Paused,
            ] {
                assert_eq!(advance(phase, true, condition), phase);
            }
        }
    }

    #[test]
    fn advance_is_idempotent_without_state_change() {
        for phase in PHASES {
            for condition in CONDITIONS {
                let once = advance(phase, false, condition);
                let twice = advance(phase, false, condition);
                assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn recovered_is_terminal() {
        for condition in CONDITIONS {
            assert_eq!(
                advance(ChaosPhase::RecoveredChaos, true, condition),
                ChaosPhase::RecoveredChaos
            );
        }
    }

    #[test]
    fn tags_and_checks() {
        let tags: Vec<_> = ALL_REQUIREMENTS.iter().map(|r| r.tag()).collect();
        assert_eq!(tags, ["experimental", "pressure", "verify"]);
        assert_eq!(InjectRequirement::Verify.to_string(), "Verify");
    }
}
