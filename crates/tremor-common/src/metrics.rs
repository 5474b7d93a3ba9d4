//! OpenTelemetry instruments for chaos experiment reconciliation
//!
//! Without an OTLP endpoint the global meter is a no-op, so recording is
//! always safe.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

static METER: Lazy<Meter> = Lazy::new(|| global::meter("tremor"));

// ============================================================================
// Reconcile Metrics
// ============================================================================

/// Histogram of experiment reconciliation duration
///
/// Labels:
/// - `experiment`: namespace/name
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("tremor_experiment_reconcile_duration_seconds")
        .with_description("Duration of ChaosExperiment reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of experiment reconciliation errors
///
/// Labels:
/// - `experiment`: namespace/name
/// - `error_type`: transient, permanent
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("tremor_experiment_reconcile_errors_total")
        .with_description("Total number of ChaosExperiment reconciliation errors")
        .with_unit("{errors}")
        .build()
});

// ============================================================================
// Lifecycle Metrics
// ============================================================================

/// Counter of phase transitions
///
/// Labels:
/// - `from`, `to`: phase names
pub static PHASE_TRANSITIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("tremor_experiment_phase_transitions_total")
        .with_description("Total number of ChaosExperiment phase transitions")
        .with_unit("{transitions}")
        .build()
});

/// Counter of recorded check results
///
/// Labels:
/// - `check`: Experimental, Pressure, Verify
/// - `success`: true, false
pub static CHECK_RESULTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("tremor_experiment_check_results_total")
        .with_description("Total number of recorded experiment check results")
        .with_unit("{results}")
        .build()
});

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record an experiment reconciliation with timing
pub struct ReconcileTimer {
    experiment: String,
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start(experiment: impl Into<String>) -> Self {
        Self {
            experiment: experiment.into(),
            start: std::time::Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[
                KeyValue::new("experiment", self.experiment),
                KeyValue::new("result", "success"),
            ],
        );
    }

    /// Record error completion
    pub fn error(self, error_type: &str) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[
                KeyValue::new("experiment", self.experiment.clone()),
                KeyValue::new("result", "error"),
            ],
        );
        RECONCILE_ERRORS.add(
            1,
            &[
                KeyValue::new("experiment", self.experiment),
                KeyValue::new("error_type", error_type.to_string()),
            ],
        );
    }
}

/// Record a phase transition
pub fn record_phase_transition(from: &str, to: &str) {
    PHASE_TRANSITIONS.add(
        1,
        &[
            KeyValue::new("from", from.to_string()),
            KeyValue::new("to", to.to_string()),
        ],
    );
}

/// Record a check result written to the ledger
pub fn record_check_result(check: &str, success: bool) {
    CHECK_RESULTS.add(
        1,
        &[
            KeyValue::new("check", check.to_string()),
            KeyValue::new("success", success),
        ],
    );
}
