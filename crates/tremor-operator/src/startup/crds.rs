//! CRD installation on startup using server-side apply

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use tremor_common::crd::ChaosExperiment;
use tremor_common::CONTROLLER_NAME;

/// CRD definition with name and resource
pub struct CrdDef {
    pub name: &'static str,
    pub crd: CustomResourceDefinition,
}

/// CRDs owned by the operator. Chaos Mesh CRDs belong to Chaos Mesh and
/// are only discovered, never installed.
pub fn tremor_crds() -> Vec<CrdDef> {
    vec![CrdDef {
        name: "chaosexperiments.tremor.dev",
        crd: ChaosExperiment::crd(),
    }]
}

/// Install or update the operator's CRDs so their schema matches this build
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(CONTROLLER_NAME).force();

    for def in tremor_crds() {
        tracing::info!("Installing {} CRD...", def.name);
        crds.patch(def.name, &params, &Patch::Apply(&def.crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", def.name, e))?;
    }
    tracing::info!("CRDs installed/updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crd_names_match_generated_metadata() {
        for def in tremor_crds() {
            assert_eq!(def.crd.metadata.name.as_deref(), Some(def.name));
        }
    }
}
