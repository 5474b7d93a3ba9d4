//! ChaosExperiment controller
//!
//! Drives an experiment through its phases:
//! - translates the embedded fault into a Chaos Mesh `PodChaos` or `NetworkChaos`
//! - keeps a companion ConfigMap with the experiment's scripts
//! - runs one Kubernetes Job per requirement (experimental, pressure, verify)
//! - records check results and advances the phase from job and fault state

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod fault;
pub mod job;
pub mod ledger;
pub mod phase;
pub mod status;

pub use controller::{error_policy, reconcile, Context, ControllerConfig};
pub use error::ChaosError;
