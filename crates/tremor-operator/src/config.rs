//! Command-line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};

use tremor_chaos::ControllerConfig;

/// Tremor - chaos experiment operator for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "tremor", version, about, long_about = None)]
pub struct Cli {
    /// Print the ChaosExperiment CRD manifest and exit
    #[arg(long)]
    pub crd: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ChaosExperiment controller (default mode)
    Controller(ControllerArgs),
}

/// Controller settings
#[derive(Parser, Debug, Clone)]
pub struct ControllerArgs {
    /// Kubeconfig to use instead of in-cluster or `$KUBECONFIG` inference
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Seconds between passes for a healthy experiment (at least 1)
    #[arg(
        long,
        env = "TREMOR_REQUEUE_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub requeue_secs: u64,

    /// Seconds before retrying a failed pass (at least 1)
    #[arg(
        long,
        env = "TREMOR_ERROR_REQUEUE_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub error_requeue_secs: u64,

    /// Apply the ChaosExperiment CRD on startup
    #[arg(long, env = "TREMOR_INSTALL_CRDS", default_value_t = true, action = ArgAction::Set)]
    pub install_crds: bool,

    /// OTLP collector for traces and metrics
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Cli {
    /// Controller arguments, defaulting when no subcommand was given
    pub fn controller_args(self) -> Result<ControllerArgs, clap::Error> {
        match self.command {
            Some(Commands::Controller(args)) => Ok(args),
            None => ControllerArgs::try_parse_from(["controller"]),
        }
    }
}

impl ControllerArgs {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            requeue_interval: Duration::from_secs(self.requeue_secs),
            error_requeue_interval: Duration::from_secs(self.error_requeue_secs),
            ..Default::default()
        }
    }
}
