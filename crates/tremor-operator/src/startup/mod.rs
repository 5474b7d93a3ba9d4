//! Startup utilities for the tremor operator

mod crds;

pub use crds::{ensure_crds_installed, tremor_crds, CrdDef};
