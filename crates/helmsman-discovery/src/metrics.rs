//! Discovery server metrics.
//!
//! Emits the Prometheus series consumed by mesh dashboards and keeps atomic
//! mirrors so embedders and tests can read values without installing a
//! metrics recorder.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use ::metrics::{counter, gauge};
use helmsman_core::TypeUrl;

/// Metric mirror for the discovery server.
#[derive(Debug, Default)]
pub struct DiscoveryMetrics {
    active: AtomicI64,
    cds_pushes: AtomicU64,
    lds_pushes: AtomicU64,
    rds_pushes: AtomicU64,
    eds_pushes: AtomicU64,
    cds_rejects: AtomicU64,
    lds_rejects: AtomicU64,
    eds_rejects: AtomicU64,
    push_timeouts: AtomicU64,
    write_timeouts: AtomicU64,
    short_push_errors: AtomicU64,
    long_push_errors: AtomicU64,
}

impl DiscoveryMetrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Track the live connection count.
    pub(crate) fn set_active_connections(&self, count: usize) {
        self.active.store(count as i64, Ordering::Relaxed);
        gauge!("pilot_xds").set(count as f64);
    }

    /// Record a NACK for the given resource type.
    pub(crate) fn record_reject(&self, type_url: &str, node_id: &str, error: &str) {
        match type_url {
            TypeUrl::CLUSTER => {
                self.cds_rejects.fetch_add(1, Ordering::Relaxed);
                gauge!("pilot_xds_cds_reject", "node" => node_id.to_string(), "err" => error.to_string())
                    .increment(1.0);
            }
            TypeUrl::LISTENER => {
                self.lds_rejects.fetch_add(1, Ordering::Relaxed);
                gauge!("pilot_xds_lds_reject", "node" => node_id.to_string(), "err" => error.to_string())
                    .increment(1.0);
            }
            TypeUrl::ENDPOINT => {
                self.eds_rejects.fetch_add(1, Ordering::Relaxed);
                gauge!("pilot_xds_eds_reject", "node" => node_id.to_string(), "err" => error.to_string())
                    .increment(1.0);
            }
            _ => {}
        }
    }

    /// Record a successful push of one resource type.
    pub(crate) fn record_push(&self, kind: &'static str) {
        match kind {
            "cds" => self.cds_pushes.fetch_add(1, Ordering::Relaxed),
            "lds" => self.lds_pushes.fetch_add(1, Ordering::Relaxed),
            "rds" => self.rds_pushes.fetch_add(1, Ordering::Relaxed),
            "eds" => self.eds_pushes.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
        counter!("pilot_xds_pushes", "type" => kind).increment(1);
    }

    /// Record a failed generation attempt for one resource type.
    pub(crate) fn record_push_error(&self, kind: &'static str) {
        counter!("pilot_xds_pushes", "type" => kind).increment(1);
    }

    /// Record a push-channel signal that hit its deadline.
    pub(crate) fn record_push_timeout(&self) {
        self.push_timeouts.fetch_add(1, Ordering::Relaxed);
        counter!("pilot_xds_push_timeout").increment(1);
    }

    /// Record a response send that hit its deadline.
    pub(crate) fn record_write_timeout(&self) {
        self.write_timeouts.fetch_add(1, Ordering::Relaxed);
        counter!("pilot_xds_write_timeout").increment(1);
    }

    /// Record back-pressure on a client: `short` on the first failure,
    /// `long` once the client has been stuck for a while.
    pub(crate) fn record_backpressure(&self, kind: &'static str) {
        match kind {
            "short" => self.short_push_errors.fetch_add(1, Ordering::Relaxed),
            "long" => self.long_push_errors.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
        counter!("pilot_xds_push_errors", "type" => kind).increment(1);
    }

    /// Live connections.
    pub fn active_connections(&self) -> i64 {
        self.active.load(Ordering::Relaxed)
    }

    /// CDS pushes sent.
    pub fn cds_pushes(&self) -> u64 {
        self.cds_pushes.load(Ordering::Relaxed)
    }

    /// LDS pushes sent.
    pub fn lds_pushes(&self) -> u64 {
        self.lds_pushes.load(Ordering::Relaxed)
    }

    /// RDS pushes sent.
    pub fn rds_pushes(&self) -> u64 {
        self.rds_pushes.load(Ordering::Relaxed)
    }

    /// EDS pushes sent.
    pub fn eds_pushes(&self) -> u64 {
        self.eds_pushes.load(Ordering::Relaxed)
    }

    /// CDS NACKs received.
    pub fn cds_rejects(&self) -> u64 {
        self.cds_rejects.load(Ordering::Relaxed)
    }

    /// LDS NACKs received.
    pub fn lds_rejects(&self) -> u64 {
        self.lds_rejects.load(Ordering::Relaxed)
    }

    /// EDS NACKs received.
    pub fn eds_rejects(&self) -> u64 {
        self.eds_rejects.load(Ordering::Relaxed)
    }

    /// Push-channel signal deadline hits.
    pub fn push_timeouts(&self) -> u64 {
        self.push_timeouts.load(Ordering::Relaxed)
    }

    /// Response send deadline hits.
    pub fn write_timeouts(&self) -> u64 {
        self.write_timeouts.load(Ordering::Relaxed)
    }

    /// First-failure back-pressure events.
    pub fn short_push_errors(&self) -> u64 {
        self.short_push_errors.load(Ordering::Relaxed)
    }

    /// Stuck-client back-pressure events.
    pub fn long_push_errors(&self) -> u64 {
        self.long_push_errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_counters_by_type() {
        let metrics = DiscoveryMetrics::new();
        metrics.record_push("cds");
        metrics.record_push("cds");
        metrics.record_push("eds");
        assert_eq!(metrics.cds_pushes(), 2);
        assert_eq!(metrics.eds_pushes(), 1);
        assert_eq!(metrics.lds_pushes(), 0);
    }

    #[test]
    fn reject_counters_by_type_url() {
        let metrics = DiscoveryMetrics::new();
        metrics.record_reject(TypeUrl::CLUSTER, "node-a", "bad cluster");
        metrics.record_reject(TypeUrl::ENDPOINT, "node-a", "bad endpoints");
        metrics.record_reject("type.googleapis.com/unknown.Type", "node-a", "ignored");
        assert_eq!(metrics.cds_rejects(), 1);
        assert_eq!(metrics.eds_rejects(), 1);
        assert_eq!(metrics.lds_rejects(), 0);
    }

    #[test]
    fn backpressure_counters() {
        let metrics = DiscoveryMetrics::new();
        metrics.record_backpressure("short");
        metrics.record_backpressure("long");
        metrics.record_backpressure("short");
        assert_eq!(metrics.short_push_errors(), 2);
        assert_eq!(metrics.long_push_errors(), 1);
    }
}
