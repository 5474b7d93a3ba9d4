//! Requirement job builder
//!
//! Builds the batch Job that runs an experiment's Experimental, Pressure or
//! Verify payload. Building is pure: the same experiment and requirement
//! always produce the same Job, stamped with a hash of its spec so later
//! passes can detect drift without comparing server-defaulted fields.

use std::collections::BTreeMap;
use std::str::FromStr;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use tremor_common::crd::ChaosExperiment;
use tremor_common::kube_utils::deterministic_hash;
use tremor_common::{
    EXPERIMENT_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE, REQUIREMENT_LABEL, SPEC_HASH_ANNOTATION,
};

use crate::config::{config_map_name, CONFIG_MOUNT_PATH};
use crate::error::ChaosError;
use crate::phase::InjectRequirement;

// Annotation overrides read from the experiment
pub const COMPLETIONS_ANNOTATION: &str = "job.tremor.dev/completions";
pub const ACTIVE_DEADLINE_SECONDS_ANNOTATION: &str = "job.tremor.dev/activeDeadlineSeconds";
pub const PARALLELISM_ANNOTATION: &str = "job.tremor.dev/parallelism";
pub const BACKOFF_LIMIT_ANNOTATION: &str = "job.tremor.dev/backoffLimit";
pub const TTL_SECONDS_AFTER_FINISHED_ANNOTATION: &str = "job.tremor.dev/ttlSecondsAfterFinished";
pub const SUSPEND_ANNOTATION: &str = "job.tremor.dev/suspend";

pub const DEFAULT_IMAGE: &str = "perl:5.34.0";
pub const DEFAULT_CONTAINER_NAME: &str = "tremor-runtime";
const CONFIG_VOLUME_NAME: &str = "tremor-scripts";

fn default_command() -> Vec<String> {
    ["perl", "-Mbignum=bpi", "-wle", "print bpi(1000)"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_resources() -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("100m".to_string())),
            ("memory".to_string(), Quantity("64Mi".to_string())),
        ])),
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("500m".to_string())),
            ("memory".to_string(), Quantity("256Mi".to_string())),
        ])),
        ..Default::default()
    }
}

/// Job name for an experiment and requirement
pub fn job_name(experiment: &str, requirement: InjectRequirement) -> String {
    format!("{}-{}", experiment, requirement.tag())
}

// =============================================================================
// Builder
// =============================================================================

/// Fluent builder over the default job template
///
/// The template restarts pods on failure and runs a single container with a
/// deterministic CPU-bound payload.
pub struct JobBuilder {
    job: Job,
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            job: Job {
                metadata: ObjectMeta::default(),
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        metadata: None,
                        spec: Some(PodSpec {
                            containers: vec![],
                            restart_policy: Some("OnFailure".to_string()),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
                status: None,
            },
        }
    }

    fn spec(&mut self) -> &mut JobSpec {
        self.job.spec.get_or_insert_with(JobSpec::default)
    }

    fn pod_spec(&mut self) -> &mut PodSpec {
        self.spec().template.spec.get_or_insert_with(PodSpec::default)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.job.metadata.name = Some(name.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.job.metadata.namespace = Some(namespace.into());
        self
    }

    /// Labels for the Job object; `pod_labels` go on the pod template
    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.job.metadata.labels = Some(labels);
        self
    }

    pub fn pod_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.spec()
            .template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .labels = Some(labels);
        self
    }

    pub fn owner(mut self, owner: Option<OwnerReference>) -> Self {
        self.job.metadata.owner_references = owner.map(|o| vec![o]);
        self
    }

    pub fn completions(mut self, value: i32) -> Self {
        self.spec().completions = Some(value);
        self
    }

    pub fn active_deadline_seconds(mut self, value: i64) -> Self {
        self.spec().active_deadline_seconds = Some(value);
        self
    }

    pub fn parallelism(mut self, value: i32) -> Self {
        self.spec().parallelism = Some(value);
        self
    }

    pub fn backoff_limit(mut self, value: i32) -> Self {
        self.spec().backoff_limit = Some(value);
        self
    }

    pub fn ttl_seconds_after_finished(mut self, value: i32) -> Self {
        self.spec().ttl_seconds_after_finished = Some(value);
        self
    }

    pub fn suspend(mut self, value: bool) -> Self {
        self.spec().suspend = Some(value);
        self
    }

    /// Set the container, replacing an existing one with the same name
    pub fn container(mut self, container: Container) -> Self {
        let containers = &mut self.pod_spec().containers;
        match containers.iter_mut().find(|c| c.name == container.name) {
            Some(existing) => *existing = container,
            None => containers.push(container),
        }
        self
    }

    /// Mount the experiment's script ConfigMap into every container
    pub fn config_volume(mut self, config_map: impl Into<String>) -> Self {
        let pod = self.pod_spec();
        pod.volumes = Some(vec![Volume {
            name: CONFIG_VOLUME_NAME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.into(),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        for c in pod.containers.iter_mut() {
            c.volume_mounts = Some(vec![VolumeMount {
                name: CONFIG_VOLUME_NAME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            }]);
        }
        self
    }

    /// Finish the job, stamping the spec hash annotation
    pub fn build(mut self) -> Result<Job, ChaosError> {
        let hash = deterministic_hash(&serde_json::to_string(&self.job.spec)?);
        self.job
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(SPEC_HASH_ANNOTATION.to_string(), hash);
        Ok(self.job)
    }
}

// =============================================================================
// Experiment → Job
// =============================================================================

fn parse_override<T>(
    annotations: &BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ChaosError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    annotations
        .get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ChaosError::InvalidOverride {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}

fn parse_suspend(annotations: &BTreeMap<String, String>) -> Result<Option<bool>, ChaosError> {
    match annotations.get(SUSPEND_ANNOTATION).map(String::as_str) {
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(other) => Err(ChaosError::InvalidOverride {
            key: SUSPEND_ANNOTATION.to_string(),
            value: other.to_string(),
            reason: "expected \"true\" or \"false\"".to_string(),
        }),
    }
}

fn requirement_labels(experiment: &str, requirement: InjectRequirement) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (EXPERIMENT_LABEL.to_string(), experiment.to_string()),
        (REQUIREMENT_LABEL.to_string(), requirement.tag().to_string()),
    ])
}

fn runtime_container(experiment: &ChaosExperiment, requirement: InjectRequirement) -> Container {
    let jobs = &experiment.spec.inject_job;
    let script = match requirement {
        InjectRequirement::Experimental => jobs.experimental.as_deref(),
        InjectRequirement::Pressure => jobs.pressure.as_deref(),
        InjectRequirement::Verify => jobs.verify.as_deref(),
    };
    let command = match script {
        Some(s) if !s.trim().is_empty() => {
            vec!["sh".to_string(), "-c".to_string(), s.to_string()]
        }
        _ => default_command(),
    };

    Container {
        name: DEFAULT_CONTAINER_NAME.to_string(),
        image: Some(jobs.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.to_string())),
        command: Some(command),
        env: Some(vec![EnvVar {
            name: "TREMOR_REQUIREMENT".to_string(),
            value: Some(requirement.tag().to_string()),
            ..Default::default()
        }]),
        resources: Some(default_resources()),
        ..Default::default()
    }
}

/// Build the desired job for `requirement`.
///
/// Annotation overrides are applied in a fixed order. Values are taken
/// verbatim; any malformed value, surrounding whitespace included, fails
/// the whole build.
pub fn build_job(
    experiment: &ChaosExperiment,
    requirement: InjectRequirement,
) -> Result<Job, ChaosError> {
    let name = experiment.name_any();
    let namespace = experiment
        .namespace()
        .ok_or(ChaosError::MissingNamespace)?;
    let annotations = experiment.annotations();

    let mut labels = experiment.labels().clone();
    labels.extend(requirement_labels(&name, requirement));

    let mut builder = JobBuilder::new()
        .name(job_name(&name, requirement))
        .namespace(namespace)
        .labels(labels)
        .pod_labels(requirement_labels(&name, requirement))
        .owner(experiment.controller_owner_ref(&()))
        .container(runtime_container(experiment, requirement))
        .config_volume(config_map_name(&name));

    if let Some(v) = parse_override::<i32>(annotations, COMPLETIONS_ANNOTATION)? {
        builder = builder.completions(v);
    }
    if let Some(v) = parse_override::<i64>(annotations, ACTIVE_DEADLINE_SECONDS_ANNOTATION)? {
        builder = builder.active_deadline_seconds(v);
    }
    if let Some(v) = parse_override::<i32>(annotations, PARALLELISM_ANNOTATION)? {
        builder = builder.parallelism(v);
    }
    if let Some(v) = parse_override::<i32>(annotations, BACKOFF_LIMIT_ANNOTATION)? {
        builder = builder.backoff_limit(v);
    }
    if let Some(v) = parse_override::<i32>(annotations, TTL_SECONDS_AFTER_FINISHED_ANNOTATION)? {
        builder = builder.ttl_seconds_after_finished(v);
    }
    if let Some(v) = parse_suspend(annotations)? {
        builder = builder.suspend(v);
    }

    builder.build()
}

// =============================================================================
// Live Job Inspection
// =============================================================================

/// Hash stamped on a job by [`JobBuilder::build`]
pub fn spec_hash(job: &Job) -> Option<&str> {
    job.annotations().get(SPEC_HASH_ANNOTATION).map(String::as_str)
}

/// Reduced view of a job's status conditions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Active,
    Complete,
    Failed,
    Suspended,
}

impl JobOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

pub fn job_outcome(job: &Job) -> JobOutcome {
    let conditions = job
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();
    let is_true = |type_: &str| {
        conditions
            .iter()
            .any(|c| c.type_ == type_ && c.status == "True")
    };

    if is_true("Complete") {
        JobOutcome::Complete
    } else if is_true("Failed") || is_true("FailureTarget") {
        JobOutcome::Failed
    } else if is_true("Suspended") {
        JobOutcome::Suspended
    } else {
        JobOutcome::Active
    }
}

/// Succeeded pods reached the requested completion count (default 1)
pub fn job_succeeded(job: &Job) -> bool {
    let succeeded = job.status.as_ref().and_then(|s| s.succeeded).unwrap_or(0);
    let completions = job
        .spec
        .as_ref()
        .and_then(|s| s.completions)
        .unwrap_or(1);
    succeeded >= completions
}

/// Label selector for the pods the job controller created
pub fn pod_selector(job: &Job) -> String {
    let match_labels = job
        .spec
        .as_ref()
        .and_then(|s| s.selector.as_ref())
        .and_then(|s| s.match_labels.as_ref())
        .filter(|m| !m.is_empty());

    match match_labels {
        Some(labels) => labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
        None => format!("job-name={}", job.name_any()),
    }
}
