//! The change-driven fan-out loop.
//!
//! [`DiscoveryServer::broadcast`] is the entry point invoked by the change
//! notifier whenever the registry or config store changes. It recomputes
//! endpoint assignments once per watched cluster, then signals every live
//! connection's push channel with a per-client deadline. The actual resource
//! regeneration and sending happens in each connection's own stream loop.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::connection::{PushEvent, PushFailure};
use crate::DiscoveryServer;

/// A client failing its push signals for this long gets the louder warning.
const LONG_PUSH_THRESHOLD: Duration = Duration::from_secs(10);

impl DiscoveryServer {
    /// Fan a configuration change out to every connected proxy.
    ///
    /// Clients are signalled serially; parallel fan-out risks CPU and memory
    /// spikes when a mesh-wide change lands. A single stuck client costs at
    /// most `push_timeout` and never aborts the broadcast. The push channel
    /// holds one slot, so a signal already pending coalesces with this one.
    pub async fn broadcast(&self) {
        helmsman_core::version::bump_version();

        // Snapshot the EDS index, release the lock, then recompute each
        // assignment once per change instead of once per watcher.
        let clusters = self.eds().cluster_names();
        for cluster in &clusters {
            match self.generator().build_endpoint(self.env(), cluster) {
                Ok(assignment) => {
                    self.eds().set_assignment(cluster, assignment);
                }
                Err(err) => {
                    error!(cluster = %cluster, error = %err, "failed to update endpoint assignment");
                }
            }
        }

        // Snapshot the registry, release the lock, then signal.
        let connections = self.registry().snapshot();
        debug!(
            connections = connections.len(),
            clusters = clusters.len(),
            "broadcasting config change"
        );

        for conn in connections {
            let mut done = conn.done_receiver();
            tokio::select! {
                sent = conn.push_sender().send(PushEvent::default()) => {
                    if sent.is_ok() {
                        conn.record_push_ok();
                    }
                }
                _ = done.wait_for(|closed| *closed) => {
                    // Connection is going away; its teardown handles cleanup.
                }
                _ = tokio::time::sleep(self.config().push_timeout) => {
                    self.metrics().record_push_timeout();
                    match conn.record_push_failure(LONG_PUSH_THRESHOLD) {
                        PushFailure::First => {
                            warn!(conn = %conn.conn_id(), "failed to push, client busy");
                            self.metrics().record_backpressure("short");
                        }
                        PushFailure::Stuck(stuck_for) => {
                            warn!(
                                conn = %conn.conn_id(),
                                stuck_for = ?stuck_for,
                                "repeated failure to push"
                            );
                            self.metrics().record_backpressure("long");
                        }
                        PushFailure::Recent => {}
                    }
                }
            }
        }
    }
}
