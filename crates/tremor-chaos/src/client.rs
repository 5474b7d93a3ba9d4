//! Kubernetes access for the chaos controller
//!
//! Everything the reconciler reads or writes goes through [`ChaosKubeClient`]
//! so the orchestration logic can be tested against mocks.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{Api, DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use tremor_common::crd::{ChaosExperiment, ChaosExperimentStatus};
use tremor_common::CONTROLLER_NAME;

use crate::error::ChaosError;

/// Trait abstracting Kubernetes operations for ChaosExperiment reconciliation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChaosKubeClient: Send + Sync {
    /// Fresh read of an experiment; `None` once it is gone
    async fn get_experiment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChaosExperiment>, ChaosError>;

    /// Merge-patch the status subresource.
    ///
    /// When `resource_version` is set the write is conditional and fails
    /// with 409 if the object moved on.
    async fn patch_experiment_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        status: &ChaosExperimentStatus,
    ) -> Result<(), ChaosError>;

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, ChaosError>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), ChaosError>;

    /// Replace a ConfigMap; `config_map` must carry the live resourceVersion
    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<(), ChaosError>;

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ChaosError>;

    async fn create_job(&self, job: &Job) -> Result<(), ChaosError>;

    /// Delete a job and its pods; an already-missing job is not an error
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ChaosError>;

    /// Pods matching a label selector string
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, ChaosError>;

    /// Full log of a pod's first container
    async fn pod_log(&self, namespace: &str, pod: &str) -> Result<String, ChaosError>;
}

/// Production implementation over a kube [`Client`]
#[derive(Clone)]
pub struct KubeChaosClient {
    client: Client,
}

impl KubeChaosClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> Result<&str, ChaosError> {
    meta.namespace.as_deref().ok_or(ChaosError::MissingNamespace)
}

#[async_trait]
impl ChaosKubeClient for KubeChaosClient {
    async fn get_experiment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChaosExperiment>, ChaosError> {
        Ok(self.namespaced::<ChaosExperiment>(namespace).get_opt(name).await?)
    }

    async fn patch_experiment_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        status: &ChaosExperimentStatus,
    ) -> Result<(), ChaosError> {
        let mut patch = serde_json::json!({ "status": status });
        if let Some(rv) = resource_version {
            patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
        }
        self.namespaced::<ChaosExperiment>(namespace)
            .patch_status(name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, ChaosError> {
        Ok(self.namespaced::<ConfigMap>(namespace).get_opt(name).await?)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), ChaosError> {
        let ns = namespace_of(&config_map.metadata)?;
        self.namespaced::<ConfigMap>(ns)
            .create(&PostParams::default(), config_map)
            .await?;
        Ok(())
    }

    async fn replace_config_map(&self, config_map: &ConfigMap) -> Result<(), ChaosError> {
        let ns = namespace_of(&config_map.metadata)?;
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        self.namespaced::<ConfigMap>(ns)
            .replace(name, &PostParams::default(), config_map)
            .await?;
        Ok(())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ChaosError> {
        Ok(self.namespaced::<Job>(namespace).get_opt(name).await?)
    }

    async fn create_job(&self, job: &Job) -> Result<(), ChaosError> {
        let ns = namespace_of(&job.metadata)?;
        self.namespaced::<Job>(ns)
            .create(&PostParams::default(), job)
            .await?;
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ChaosError> {
        match self
            .namespaced::<Job>(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if tremor_common::error::is_not_found(&e) => {
                debug!(job = %name, "job already deleted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, ChaosError> {
        let pods = self
            .namespaced::<Pod>(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(pods.items)
    }

    async fn pod_log(&self, namespace: &str, pod: &str) -> Result<String, ChaosError> {
        Ok(self
            .namespaced::<Pod>(namespace)
            .logs(pod, &LogParams::default())
            .await?)
    }
}
