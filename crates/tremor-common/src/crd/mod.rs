//! Custom Resource Definitions for tremor
//!
//! `ChaosExperiment` is the only CRD tremor owns; the fault types describe the
//! embedded fault that is translated into Chaos Mesh resources.

mod experiment;
mod fault;

pub use experiment::{
    ChaosCondition, ChaosExperiment, ChaosExperimentSpec, ChaosExperimentStatus, ChaosPhase,
    ChaosResult, EmbeddedFault, Expect, InjectJobSpec, ResultDetail,
};
pub use fault::{
    ContainerKillParams, CorruptParams, DelayParams, Direction, DuplicateParams, LossParams,
    NetworkChaosAction, NetworkChaosParams, NetworkChaosSpec, PodChaosAction, PodChaosParams,
    PodChaosSpec, PodFailureParams, PodSelector, SelectorRequirement,
};
