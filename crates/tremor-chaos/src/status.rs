//! Status reconciliation
//!
//! Observes the active job and the live fault, records check results, advances
//! the phase one step and writes the status back with conflict retry.

use k8s_openapi::api::batch::v1::Job;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use tremor_common::crd::{
    ChaosCondition, ChaosExperiment, ChaosExperimentStatus, ChaosPhase, ChaosResult,
};
use tremor_common::events::{actions, reasons};
use tremor_common::metrics::{record_check_result, record_phase_transition};
use tremor_common::retry::retry_with_backoff_when;

use crate::client::ChaosKubeClient;
use crate::controller::Context;
use crate::error::ChaosError;
use crate::fault::{translate_condition, FaultKind};
use crate::job::{job_name, job_outcome, job_succeeded, pod_selector, JobOutcome};
use crate::ledger::{has_result, upsert_result};
use crate::phase::{advance, next_requirement, InjectRequirement};

/// What one pass saw, independent of the status it is applied to
#[derive(Debug, Default)]
struct Observation {
    job_succeeded: bool,
    condition: ChaosCondition,
    failure: Option<(String, ChaosResult)>,
    verify: Option<ChaosResult>,
}

/// Run the status step for `experiment`.
///
/// Returns quietly when the experiment disappears mid-pass.
pub async fn reconcile_status(experiment: &ChaosExperiment, ctx: &Context) -> Result<(), ChaosError> {
    let name = experiment.name_any();
    let namespace = experiment
        .namespace()
        .ok_or(ChaosError::MissingNamespace)?;

    let Some(fresh) = ctx.kube.get_experiment(&namespace, &name).await? else {
        debug!(experiment = %name, "experiment gone before status update");
        return Ok(());
    };

    let observation = observe(&fresh, &namespace, ctx).await?;
    let before = fresh.status.clone().unwrap_or_default();

    let Some(written) = write_status(ctx, &namespace, &name, |status| {
        apply_observation(status, &observation)
    })
    .await?
    else {
        return Ok(());
    };

    publish_changes(&fresh, ctx, &before, &written, &observation).await;
    Ok(())
}

async fn observe(
    experiment: &ChaosExperiment,
    namespace: &str,
    ctx: &Context,
) -> Result<Observation, ChaosError> {
    let name = experiment.name_any();
    let phase = experiment.status.as_ref().and_then(|s| s.phase);
    let requirement = next_requirement(phase);
    let job = ctx
        .kube
        .get_job(namespace, &job_name(&name, requirement))
        .await?;

    let mut observation = Observation {
        job_succeeded: job.as_ref().is_some_and(job_succeeded),
        ..Default::default()
    };

    if let Some(job) = &job {
        let outcome = job_outcome(job);
        if outcome == JobOutcome::Failed && requirement != InjectRequirement::Verify {
            let check = requirement.check_name();
            let text = format!("job {} failed", job.name_any());
            observation.failure = Some((check.to_string(), ChaosResult::new(check, false, text)));
        }

        let verified = experiment
            .status
            .as_ref()
            .is_some_and(|s| has_result(&s.results, InjectRequirement::Verify.check_name()));
        if phase == Some(ChaosPhase::RecoveredChaos) && !verified && outcome.is_finished() {
            observation.verify = verify(experiment, namespace, job, outcome, ctx).await?;
        }
    }

    let kind = experiment
        .spec
        .validated_fault(&name)
        .map(FaultKind::of)
        .ok();
    let fault = match kind {
        Some(kind) => ctx.faults.get(kind, namespace, &name).await?,
        None => None,
    };
    observation.condition = translate_condition(experiment, fault.as_ref());

    Ok(observation)
}

/// Compare the verify pod's log with the expectation.
///
/// `None` when no pod can be found yet; the next pass tries again.
async fn verify(
    experiment: &ChaosExperiment,
    namespace: &str,
    job: &Job,
    outcome: JobOutcome,
    ctx: &Context,
) -> Result<Option<ChaosResult>, ChaosError> {
    let pods = ctx.kube.list_pods(namespace, &pod_selector(job)).await?;
    let Some(pod) = pods.first() else {
        debug!(job = %job.name_any(), "verify job has no pods to read");
        return Ok(None);
    };

    let log = ctx.kube.pod_log(namespace, &pod.name_any()).await?;
    let output = log.trim_end();
    let expected = experiment.spec.expected_verify().trim_end();
    let success = outcome == JobOutcome::Complete && (expected.is_empty() || output == expected);

    let check = InjectRequirement::Verify.check_name();
    let text = if success { "job succeeded" } else { output };
    Ok(Some(ChaosResult::new(check, success, text)))
}

fn apply_observation(status: &mut ChaosExperimentStatus, observation: &Observation) {
    if let Some((check, result)) = &observation.failure {
        let recorded = status
            .results
            .iter()
            .any(|r| r.is_check(check) && r.detail.message == result.detail.message);
        if !recorded {
            upsert_result(&mut status.results, result.clone(), check);
        }
    }
    if let Some(result) = &observation.verify {
        let check = InjectRequirement::Verify.check_name();
        if !has_result(&status.results, check) {
            upsert_result(&mut status.results, result.clone(), check);
        }
    }

    let current = status.phase.unwrap_or_default();
    status.phase = Some(advance(
        current,
        observation.job_succeeded,
        observation.condition,
    ));
    status.condition = observation.condition;
}

/// Read-modify-write of the status subresource.
///
/// Each attempt re-reads the experiment and applies `mutate` to its current
/// status, so a 409 is resolved against fresh state. Returns the written
/// status, or `None` when the experiment no longer exists.
pub(crate) async fn write_status<F>(
    ctx: &Context,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<Option<ChaosExperimentStatus>, ChaosError>
where
    F: Fn(&mut ChaosExperimentStatus),
{
    let kube = ctx.kube.as_ref();
    let mutate = &mutate;

    match retry_with_backoff_when(
        &ctx.config.status_retry,
        "chaos experiment status update",
        ChaosError::is_conflict,
        || patch_once(kube, namespace, name, mutate),
    )
    .await
    {
        Ok(None) => {
            debug!(experiment = %name, "experiment deleted during status update");
            Ok(None)
        }
        Ok(written) => Ok(written),
        Err(e) if e.is_conflict() => Err(ChaosError::StatusConflict {
            experiment: name.to_string(),
            message: e.to_string(),
        }),
        Err(e) => Err(e),
    }
}

async fn patch_once<F>(
    kube: &dyn ChaosKubeClient,
    namespace: &str,
    name: &str,
    mutate: &F,
) -> Result<Option<ChaosExperimentStatus>, ChaosError>
where
    F: Fn(&mut ChaosExperimentStatus),
{
    let Some(current) = kube.get_experiment(namespace, name).await? else {
        return Ok(None);
    };
    let mut status = current.status.clone().unwrap_or_default();
    mutate(&mut status);
    match kube
        .patch_experiment_status(namespace, name, current.resource_version(), &status)
        .await
    {
        Ok(()) => Ok(Some(status)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn publish_changes(
    experiment: &ChaosExperiment,
    ctx: &Context,
    before: &ChaosExperimentStatus,
    after: &ChaosExperimentStatus,
    observation: &Observation,
) {
    let obj_ref = experiment.object_ref(&());
    let name = experiment.name_any();

    if let Some((_, result)) = &observation.failure {
        let already = before
            .results
            .iter()
            .any(|r| r.detail.message == result.detail.message);
        if !already {
            warn!(experiment = %name, message = %result.detail.message, "requirement job failed");
            ctx.events
                .publish(
                    &obj_ref,
                    EventType::Warning,
                    reasons::JOB_FAILED,
                    actions::RUN_JOB,
                    Some(result.detail.message.clone()),
                )
                .await;
        }
    }

    // Only reached once the status write landed
    if let Some(result) = &observation.verify {
        record_check_result(InjectRequirement::Verify.check_name(), result.success);
        let (type_, reason) = if result.success {
            (EventType::Normal, reasons::VERIFY_SUCCEEDED)
        } else {
            (EventType::Warning, reasons::VERIFY_FAILED)
        };
        ctx.events
            .publish(
                &obj_ref,
                type_,
                reason,
                actions::VERIFY,
                Some(result.detail.message.clone()),
            )
            .await;
    }

    let from = before.phase.unwrap_or_default();
    let to = after.phase.unwrap_or_default();
    if from != to {
        info!(experiment = %name, %from, %to, condition = %after.condition, "phase advanced");
        record_phase_transition(&from.to_string(), &to.to_string());
        ctx.events
            .publish(
                &obj_ref,
                EventType::Normal,
                reasons::PHASE_ADVANCED,
                actions::RECONCILE,
                Some(format!("{} -> {}", from, to)),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(job_succeeded: bool, condition: ChaosCondition) -> Observation {
        Observation {
            job_succeeded,
            condition,
            ..Default::default()
        }
    }

    #[test]
    fn unset_phase_is_written_explicitly() {
        let mut status = ChaosExperimentStatus::default();
        apply_observation(&mut status, &observation(false, ChaosCondition::Unknown));
        assert_eq!(status.phase, Some(ChaosPhase::BeforeExperiment));
        assert_eq!(status.condition, ChaosCondition::Unknown);
    }

    #[test]
    fn job_success_advances_one_step() {
        let mut status = ChaosExperimentStatus::default();
        apply_observation(&mut status, &observation(true, ChaosCondition::AllInjected));
        assert_eq!(status.phase, Some(ChaosPhase::AfterExperiment));
        assert_eq!(status.condition, ChaosCondition::AllInjected);
    }

    #[test]
    fn verify_result_is_recorded_once() {
        let mut status = ChaosExperimentStatus {
            phase: Some(ChaosPhase::RecoveredChaos),
            ..Default::default()
        };
        let first = Observation {
            verify: Some(ChaosResult::new("Verify", true, "job succeeded")),
            ..observation(false, ChaosCondition::AllRecovered)
        };
        apply_observation(&mut status, &first);
        let second = Observation {
            verify: Some(ChaosResult::new("Verify", false, "late")),
            ..observation(false, ChaosCondition::AllRecovered)
        };
        apply_observation(&mut status, &second);

        assert_eq!(status.results.len(), 1);
        assert!(status.results[0].success);
    }

    #[test]
    fn repeated_failure_keeps_original_timestamp() {
        let mut status = ChaosExperimentStatus::default();
        let failed = Observation {
            failure: Some((
                "Experimental".to_string(),
                ChaosResult::new("Experimental", false, "job exp-experimental failed"),
            )),
            ..observation(false, ChaosCondition::Unknown)
        };
        apply_observation(&mut status, &failed);
        let first_time = status.results[0].detail.time;
        apply_observation(&mut status, &failed);
        assert_eq!(status.results.len(), 1);
        assert_eq!(status.results[0].detail.time, first_time);
    }
}
