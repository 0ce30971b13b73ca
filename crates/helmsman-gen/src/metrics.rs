//! Generator diagnostics counters.

use std::sync::atomic::{AtomicU64, Ordering};

use ::metrics::gauge;

/// Diagnostics for listener generation.
///
/// Emits the Prometheus gauges and keeps atomic mirrors so embedders and
/// tests can read the values without a metrics recorder installed.
#[derive(Debug, Default)]
pub struct GeneratorMetrics {
    outbound_conflicts: AtomicU64,
    invalid_outbound: AtomicU64,
}

impl GeneratorMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a conflicting outbound listener (the later binding lost).
    pub(crate) fn record_outbound_conflict(&self) {
        self.outbound_conflicts.fetch_add(1, Ordering::Relaxed);
        gauge!("pilot_conf_out_listeners").increment(1.0);
    }

    /// Record an outbound listener dropped by validation.
    pub(crate) fn record_invalid_outbound(&self) {
        self.invalid_outbound.fetch_add(1, Ordering::Relaxed);
        gauge!("pilot_invalid_out_listeners").increment(1.0);
    }

    /// Conflicting outbound listeners seen so far.
    pub fn outbound_conflicts(&self) -> u64 {
        self.outbound_conflicts.load(Ordering::Relaxed)
    }

    /// Invalid outbound listeners seen so far.
    pub fn invalid_outbound(&self) -> u64 {
        self.invalid_outbound.load(Ordering::Relaxed)
    }
}
