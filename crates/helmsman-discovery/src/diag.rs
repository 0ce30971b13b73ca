//! Read-only diagnostics for operators.
//!
//! Snapshots of the live connection table and the EDS index, serializable to
//! JSON for a debug endpoint. Full last-pushed payloads are available
//! programmatically through [`DiscoveryServer::config_dump`]; the JSON view
//! stays at the name/count level.

use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::connection::LastSent;
use crate::DiscoveryServer;

/// One live connection.
#[derive(Debug, Serialize)]
pub struct ConnectionDiag {
    /// Connection id.
    pub conn_id: String,
    /// Wire node id, empty until the first request arrived.
    pub node: String,
    /// Transport-layer peer address.
    pub peer_addr: String,
    /// When the stream was accepted, as unix seconds.
    pub connected_at: u64,
    /// Seconds since the last successful push signal, if any.
    pub seconds_since_last_push: Option<u64>,
    /// Whether the connection currently fails its push signals.
    pub push_failing: bool,
    /// Whether the client watches clusters.
    pub cds_watched: bool,
    /// Whether the client watches listeners.
    pub lds_watched: bool,
    /// Watched route config names.
    pub routes: Vec<String>,
    /// Watched cluster names.
    pub clusters: Vec<String>,
}

/// One watched EDS cluster.
#[derive(Debug, Serialize)]
pub struct EdsClusterDiag {
    /// Cluster name.
    pub cluster: String,
    /// Number of connections watching it.
    pub watchers: usize,
    /// Seconds since the assignment was last recomputed.
    pub seconds_since_update: Option<u64>,
    /// Endpoints in the last assignment.
    pub endpoints: usize,
}

/// Full diagnostic snapshot.
#[derive(Debug, Serialize)]
pub struct MeshDiagnostics {
    /// Live connections.
    pub connections: Vec<ConnectionDiag>,
    /// Watched EDS clusters.
    pub eds_clusters: Vec<EdsClusterDiag>,
}

impl MeshDiagnostics {
    /// Render as pretty JSON for a debug endpoint.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl DiscoveryServer {
    /// Snapshot the live connections and the EDS index.
    pub fn diagnostics(&self) -> MeshDiagnostics {
        let mut connections: Vec<ConnectionDiag> = self
            .registry()
            .snapshot()
            .into_iter()
            .map(|conn| {
                let watch = conn.watch_state();
                ConnectionDiag {
                    conn_id: conn.conn_id().to_string(),
                    node: conn.node().map(|n| n.service_node()).unwrap_or_default(),
                    peer_addr: conn.peer_addr().to_string(),
                    connected_at: conn
                        .connected_at()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0),
                    seconds_since_last_push: conn.seconds_since_last_push(),
                    push_failing: conn.push_failing(),
                    cds_watched: watch.cds_watched,
                    lds_watched: watch.lds_watched,
                    routes: watch.routes,
                    clusters: watch.clusters,
                }
            })
            .collect();
        connections.sort_by(|a, b| a.conn_id.cmp(&b.conn_id));

        let mut eds_clusters: Vec<EdsClusterDiag> = self
            .eds()
            .snapshot()
            .into_iter()
            .map(|(cluster, watchers, seconds_since_update, endpoints)| EdsClusterDiag {
                cluster,
                watchers,
                seconds_since_update,
                endpoints,
            })
            .collect();
        eds_clusters.sort_by(|a, b| a.cluster.cmp(&b.cluster));

        MeshDiagnostics {
            connections,
            eds_clusters,
        }
    }

    /// The last pushed resources for one connection, if it is live.
    pub fn config_dump(&self, conn_id: &str) -> Option<LastSent> {
        self.registry().get(conn_id).map(|conn| conn.last_sent())
    }
}
