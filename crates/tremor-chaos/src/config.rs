//! Companion ConfigMap holding an experiment's scripts and expectation
//!
//! Requirement jobs mount it read-only, so scripts can read the expected
//! verify output or share helpers.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use tremor_common::crd::ChaosExperiment;
use tremor_common::{EXPERIMENT_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE};

use crate::error::ChaosError;

/// Where jobs see the ConfigMap
pub const CONFIG_MOUNT_PATH: &str = "/etc/tremor";

/// Key holding the expected verify output
pub const EXPECT_VERIFY_KEY: &str = "expect-verify";

pub fn config_map_name(experiment: &str) -> String {
    format!("{}-scripts", experiment)
}

/// Data derived from the spec; only present scripts get a key
pub fn desired_data(experiment: &ChaosExperiment) -> BTreeMap<String, String> {
    let jobs = &experiment.spec.inject_job;
    let mut data = BTreeMap::new();
    for (key, script) in [
        ("experimental.sh", &jobs.experimental),
        ("pressure.sh", &jobs.pressure),
        ("verify.sh", &jobs.verify),
    ] {
        if let Some(s) = script {
            data.insert(key.to_string(), s.clone());
        }
    }
    let expected = experiment.spec.expected_verify();
    if !expected.is_empty() {
        data.insert(EXPECT_VERIFY_KEY.to_string(), expected.to_string());
    }
    data
}

pub fn build_config_map(experiment: &ChaosExperiment) -> Result<ConfigMap, ChaosError> {
    let name = experiment.name_any();
    let namespace = experiment
        .namespace()
        .ok_or(ChaosError::MissingNamespace)?;

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(&name)),
            namespace: Some(namespace),
            labels: Some(BTreeMap::from([
                (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
                (EXPERIMENT_LABEL.to_string(), name.clone()),
            ])),
            owner_references: experiment.controller_owner_ref(&()).map(|o| vec![o]),
            ..Default::default()
        },
        data: Some(desired_data(experiment)),
        ..Default::default()
    })
}

/// Content equality on `data`; metadata differences never force an update
pub fn config_changed(live: &ConfigMap, desired: &ConfigMap) -> bool {
    let empty = BTreeMap::new();
    live.data.as_ref().unwrap_or(&empty) != desired.data.as_ref().unwrap_or(&empty)
}
