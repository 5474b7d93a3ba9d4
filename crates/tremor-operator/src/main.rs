//! Tremor operator - drives ChaosExperiment resources through their lifecycle

use std::sync::Arc;

use clap::Parser;
use kube::CustomResourceExt;

use tremor_common::crd::ChaosExperiment;
use tremor_common::kube_utils::create_client;
use tremor_common::telemetry::{init_telemetry, TelemetryConfig};
use tremor_common::CrdRegistry;
use tremor_operator::config::Cli;
use tremor_operator::controller_runner::build_chaos_controller;
use tremor_operator::startup::ensure_crds_installed;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The API client's TLS stack needs a process-wide crypto provider
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ChaosExperiment::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let args = cli.controller_args()?;
    let telemetry = init_telemetry(TelemetryConfig {
        service_name: "tremor-operator".to_string(),
        otlp_endpoint: args.otlp_endpoint.clone(),
    })?;

    let client = create_client(args.kubeconfig.as_deref()).await?;

    if args.install_crds {
        ensure_crds_installed(&client).await?;
    }

    let registry = Arc::new(CrdRegistry::discover(client.clone()).await);

    tracing::info!("Starting tremor controller");
    build_chaos_controller(client, registry, args.controller_config()).await;
    tracing::info!("Controller stopped");
    telemetry.shutdown();

    Ok(())
}
