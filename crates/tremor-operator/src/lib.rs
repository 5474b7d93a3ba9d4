//! Tremor operator: CLI, startup and controller wiring for ChaosExperiment

pub mod config;
pub mod controller_runner;
pub mod startup;
