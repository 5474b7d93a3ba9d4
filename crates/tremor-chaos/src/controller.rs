//! ChaosExperiment controller implementation
//!
//! One pass reconciles, in order: the fault object, the companion ConfigMap,
//! the job for the active requirement, and finally the status. A re-armed
//! fault short-circuits the pass so the next one starts from fresh state.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use tremor_common::crd::{ChaosCondition, ChaosExperiment, ChaosPhase};
use tremor_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use tremor_common::metrics::ReconcileTimer;
use tremor_common::retry::{retry_with_backoff_when, RetryConfig};
use tremor_common::{CrdRegistry, CONTROLLER_NAME};

use crate::client::{ChaosKubeClient, KubeChaosClient};
use crate::config::{build_config_map, config_changed};
use crate::error::ChaosError;
use crate::fault::{
    desired_fault, fault_changed, prepare_update, FaultClient, FaultKind, KubeFaultClient,
};
use crate::job::{build_job, job_name, pod_selector, spec_hash};
use crate::phase::{next_requirement, InjectRequirement, ALL_REQUIREMENTS};
use crate::status::{reconcile_status, write_status};

// =============================================================================
// Configuration
// =============================================================================

/// Requeue intervals and retry budgets
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Requeue after a successful pass
    pub requeue_interval: Duration,
    /// Requeue after a failed pass
    pub error_requeue_interval: Duration,
    /// Requeue after the fault object was re-armed
    pub fault_change_requeue: Duration,
    /// Waiting for a new job's pods
    pub pod_wait: RetryConfig,
    /// Status writes that hit a conflict
    pub status_retry: RetryConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_interval: Duration::from_secs(10),
            error_requeue_interval: Duration::from_secs(30),
            fault_change_requeue: Duration::from_secs(1),
            pod_wait: RetryConfig::bounded(6, Duration::from_millis(500), 5.0, 0.1),
            status_retry: RetryConfig::bounded(5, Duration::from_millis(30), 5.0, 0.1),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Shared context for the ChaosExperiment controller
pub struct Context {
    /// Cluster store access (trait object for testability)
    pub kube: Arc<dyn ChaosKubeClient>,
    /// Chaos Mesh access
    pub faults: Arc<dyn FaultClient>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    pub config: ControllerConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, registry: Arc<CrdRegistry>) -> ContextBuilder {
        ContextBuilder {
            client,
            registry,
            events: None,
            config: ControllerConfig::default(),
        }
    }

    /// Context over mocks, with no event recording
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn ChaosKubeClient>,
        faults: Arc<dyn FaultClient>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            kube,
            faults,
            events: Arc::new(tremor_common::events::NoopEventPublisher),
            config,
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    registry: Arc<CrdRegistry>,
    events: Option<Arc<dyn EventPublisher>>,
    config: ControllerConfig,
}

impl ContextBuilder {
    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Context {
        Context {
            kube: Arc::new(KubeChaosClient::new(self.client.clone())),
            faults: Arc::new(KubeFaultClient::new(self.client.clone(), self.registry)),
            events: self
                .events
                .unwrap_or_else(|| Arc::new(KubeEventPublisher::new(self.client, CONTROLLER_NAME))),
            config: self.config,
        }
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile a ChaosExperiment
#[instrument(skip(experiment, ctx), fields(experiment = %experiment.name_any()))]
pub async fn reconcile(
    experiment: Arc<ChaosExperiment>,
    ctx: Arc<Context>,
) -> Result<Action, ChaosError> {
    if experiment.metadata.deletion_timestamp.is_some() {
        debug!("deletion in progress, owned objects are garbage collected");
        return Ok(Action::await_change());
    }

    let timer = ReconcileTimer::start(format!(
        "{}/{}",
        experiment.namespace().unwrap_or_default(),
        experiment.name_any()
    ));
    match run_pass(&experiment, &ctx).await {
        Ok(action) => {
            timer.success();
            Ok(action)
        }
        Err(e) => {
            timer.error(e.error_type());
            report_failure(&experiment, &ctx, &e).await;
            Err(e)
        }
    }
}

/// Error policy: log and retry after the configured interval
pub fn error_policy(
    experiment: Arc<ChaosExperiment>,
    error: &ChaosError,
    ctx: Arc<Context>,
) -> Action {
    error!(
        ?error,
        experiment = %experiment.name_any(),
        "chaos experiment reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue_interval)
}

async fn run_pass(experiment: &ChaosExperiment, ctx: &Context) -> Result<Action, ChaosError> {
    match reconcile_fault(experiment, ctx).await {
        Ok(()) => {}
        Err(ChaosError::SpecChanged) => {
            rewind_phase(experiment, ctx).await?;
            return Ok(Action::requeue(ctx.config.fault_change_requeue));
        }
        Err(e) => return Err(e),
    }

    reconcile_config(experiment, ctx).await?;
    reconcile_job(experiment, ctx).await?;
    reconcile_status(experiment, ctx).await?;

    Ok(Action::requeue(ctx.config.requeue_interval))
}

async fn publish(
    experiment: &ChaosExperiment,
    ctx: &Context,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&experiment.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

/// Ensure the fault object matches the embedded spec.
///
/// Returns [`ChaosError::SpecChanged`] after re-arming a drifted fault.
async fn reconcile_fault(experiment: &ChaosExperiment, ctx: &Context) -> Result<(), ChaosError> {
    let desired = desired_fault(experiment)?;
    let name = experiment.name_any();
    let namespace = experiment
        .namespace()
        .ok_or(ChaosError::MissingNamespace)?;
    let kind = FaultKind::of(experiment.spec.validated_fault(&name)?);

    match ctx.faults.get(kind, &namespace, &name).await? {
        None => {
            match ctx.faults.create(&desired).await {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => {
                    debug!(fault = %name, "fault created concurrently");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
            info!(fault = %name, kind = %desired.kind, "created fault");
            publish(
                experiment,
                ctx,
                EventType::Normal,
                reasons::FAULT_CREATED,
                actions::INJECT,
                format!("Created {} {}", desired.kind, name),
            )
            .await;
            Ok(())
        }
        Some(live) if fault_changed(&live, &desired) => {
            ctx.faults.update(&prepare_update(&live, &desired)).await?;
            info!(fault = %name, kind = %desired.kind, "fault spec changed, re-armed");
            publish(
                experiment,
                ctx,
                EventType::Normal,
                reasons::FAULT_UPDATED,
                actions::INJECT,
                format!("Updated {} {}", desired.kind, name),
            )
            .await;
            Err(ChaosError::SpecChanged)
        }
        Some(_) => Ok(()),
    }
}

/// A re-armed fault has to be seen injecting and recovering again, so the
/// experiment drops back to AfterExperiment and loses its verification.
async fn rewind_phase(experiment: &ChaosExperiment, ctx: &Context) -> Result<(), ChaosError> {
    if experiment.phase() == ChaosPhase::BeforeExperiment {
        return Ok(());
    }
    let namespace = experiment
        .namespace()
        .ok_or(ChaosError::MissingNamespace)?;
    let verify = InjectRequirement::Verify.check_name();

    write_status(ctx, &namespace, &experiment.name_any(), |status| {
        if status.phase.unwrap_or_default() != ChaosPhase::BeforeExperiment {
            status.phase = Some(ChaosPhase::AfterExperiment);
            status.condition = ChaosCondition::Unknown;
            status.results.retain(|r| !r.is_check(verify));
        }
    })
    .await?;
    Ok(())
}

async fn reconcile_config(experiment: &ChaosExperiment, ctx: &Context) -> Result<(), ChaosError> {
    let desired = build_config_map(experiment)?;
    let name = desired.name_any();
    let namespace = experiment
        .namespace()
        .ok_or(ChaosError::MissingNamespace)?;

    match ctx.kube.get_config_map(&namespace, &name).await? {
        None => {
            match ctx.kube.create_config_map(&desired).await {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => return Ok(()),
                Err(e) => return Err(e),
            }
            publish(
                experiment,
                ctx,
                EventType::Normal,
                reasons::CONFIG_CREATED,
                actions::RECONCILE,
                format!("Created ConfigMap {}", name),
            )
            .await;
        }
        Some(live) if config_changed(&live, &desired) => {
            let mut update = desired;
            update.metadata.resource_version = live.metadata.resource_version;
            ctx.kube.replace_config_map(&update).await?;
            publish(
                experiment,
                ctx,
                EventType::Normal,
                reasons::CONFIG_UPDATED,
                actions::RECONCILE,
                format!("Updated ConfigMap {}", name),
            )
            .await;
        }
        Some(_) => {}
    }
    Ok(())
}

/// Converge the job set on the requirement of the stored phase.
///
/// The watched object can lag behind a rewind written earlier in the pass
/// chain, so the phase is taken from a fresh read.
async fn reconcile_job(watched: &ChaosExperiment, ctx: &Context) -> Result<(), ChaosError> {
    let name = watched.name_any();
    let namespace = watched.namespace().ok_or(ChaosError::MissingNamespace)?;
    let Some(experiment) = ctx.kube.get_experiment(&namespace, &name).await? else {
        debug!(experiment = %name, "experiment gone before job step");
        return Ok(());
    };
    let experiment = &experiment;
    let requirement = next_requirement(experiment.status.as_ref().and_then(|s| s.phase));

    for other in ALL_REQUIREMENTS.into_iter().filter(|r| *r != requirement) {
        let stale = job_name(&name, other);
        if ctx.kube.get_job(&namespace, &stale).await?.is_some() {
            ctx.kube.delete_job(&namespace, &stale).await?;
            info!(job = %stale, %requirement, "deleted job of a previous requirement");
            publish(
                experiment,
                ctx,
                EventType::Normal,
                reasons::JOB_REPLACED,
                actions::RUN_JOB,
                format!("Deleted {} job {}", other, stale),
            )
            .await;
        }
    }

    let desired = build_job(experiment, requirement)?;
    let job = desired.name_any();

    match ctx.kube.get_job(&namespace, &job).await? {
        None => {
            match ctx.kube.create_job(&desired).await {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => {
                    debug!(%job, "job created concurrently");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
            info!(%job, %requirement, "created job");
            publish(
                experiment,
                ctx,
                EventType::Normal,
                reasons::JOB_CREATED,
                actions::RUN_JOB,
                format!("Created {} job {}", requirement, job),
            )
            .await;

            let suspended = desired
                .spec
                .as_ref()
                .and_then(|s| s.suspend)
                .unwrap_or(false);
            if !suspended {
                wait_for_pods(ctx, &namespace, &desired).await?;
            }
        }
        Some(live) if spec_hash(&live) != spec_hash(&desired) => {
            // Job specs are immutable: delete now, recreate on a later pass
            ctx.kube.delete_job(&namespace, &job).await?;
            info!(%job, "job spec changed, deleted for recreation");
            publish(
                experiment,
                ctx,
                EventType::Normal,
                reasons::JOB_REPLACED,
                actions::RUN_JOB,
                format!("Deleted outdated job {}", job),
            )
            .await;
        }
        Some(_) => {}
    }
    Ok(())
}

/// Block until the job controller has created at least one pod
async fn wait_for_pods(ctx: &Context, namespace: &str, job: &Job) -> Result<(), ChaosError> {
    let kube = ctx.kube.as_ref();
    let selector = pod_selector(job);
    let job = job.name_any();

    retry_with_backoff_when(
        &ctx.config.pod_wait,
        "wait for job pods",
        |e: &ChaosError| matches!(e, ChaosError::NoPodsForJob { .. }),
        || find_pods(kube, namespace, &selector, &job),
    )
    .await
}

async fn find_pods(
    kube: &dyn ChaosKubeClient,
    namespace: &str,
    selector: &str,
    job: &str,
) -> Result<(), ChaosError> {
    if kube.list_pods(namespace, selector).await?.is_empty() {
        return Err(ChaosError::NoPodsForJob {
            job: job.to_string(),
        });
    }
    Ok(())
}

async fn report_failure(experiment: &ChaosExperiment, ctx: &Context, err: &ChaosError) {
    let (reason, action) = match err {
        ChaosError::Common(tremor_common::Error::Validation { .. }) => {
            (reasons::VALIDATION_FAILED, actions::RECONCILE)
        }
        ChaosError::InvalidOverride { .. } => (reasons::JOB_BUILD_FAILED, actions::RUN_JOB),
        _ => (reasons::RECONCILE_FAILED, actions::RECONCILE),
    };
    warn!(error = %err, reason, "reconcile pass failed");
    publish(experiment, ctx, EventType::Warning, reason, action, err.to_string()).await;
}
