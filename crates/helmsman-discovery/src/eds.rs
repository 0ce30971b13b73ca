//! Secondary index: cluster name to the connections watching it.
//!
//! Each entry also carries the most recent endpoint assignment and its
//! update time, so the broadcast loop recomputes once per cluster rather
//! than once per watcher. The index has its own lock, never acquired while
//! the primary registry lock is held.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use helmsman_api::endpoint::ClusterLoadAssignment;
use tracing::debug;

use crate::connection::XdsConnection;

pub(crate) struct EdsIndex {
    inner: RwLock<HashMap<String, EdsCluster>>,
}

#[derive(Default)]
struct EdsCluster {
    connections: HashMap<String, Arc<XdsConnection>>,
    assignment: Option<Arc<ClusterLoadAssignment>>,
    updated_at: Option<Instant>,
}

impl EdsIndex {
    pub(crate) fn new() -> Self {
        EdsIndex {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection as a watcher of `cluster`.
    pub(crate) fn add(&self, cluster: &str, conn_id: &str, conn: Arc<XdsConnection>) {
        let mut inner = self.inner.write().expect("eds lock poisoned");
        inner
            .entry(cluster.to_string())
            .or_default()
            .connections
            .insert(conn_id.to_string(), conn);
    }

    /// Drop a connection's watch on `cluster`; the entry goes away with its
    /// last watcher.
    pub(crate) fn remove(&self, cluster: &str, conn_id: &str) {
        let mut inner = self.inner.write().expect("eds lock poisoned");
        if let Some(entry) = inner.get_mut(cluster) {
            entry.connections.remove(conn_id);
            if entry.connections.is_empty() {
                inner.remove(cluster);
                debug!(cluster = %cluster, "last EDS watcher gone, dropping cluster entry");
            }
        }
    }

    /// Remove every watch a connection holds. Called during teardown.
    pub(crate) fn remove_connection(&self, clusters: &[String], conn_id: &str) {
        for cluster in clusters {
            self.remove(cluster, conn_id);
        }
    }

    /// Snapshot the watched cluster names. Taken under the lock, released
    /// before recomputation.
    pub(crate) fn cluster_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("eds lock poisoned");
        inner.keys().cloned().collect()
    }

    /// Store a freshly computed assignment, returning the shared copy.
    pub(crate) fn set_assignment(
        &self,
        cluster: &str,
        assignment: ClusterLoadAssignment,
    ) -> Arc<ClusterLoadAssignment> {
        let shared = Arc::new(assignment);
        let mut inner = self.inner.write().expect("eds lock poisoned");
        let entry = inner.entry(cluster.to_string()).or_default();
        entry.assignment = Some(Arc::clone(&shared));
        entry.updated_at = Some(Instant::now());
        shared
    }

    /// The most recent assignment for a cluster, if computed.
    pub(crate) fn assignment(&self, cluster: &str) -> Option<Arc<ClusterLoadAssignment>> {
        let inner = self.inner.read().expect("eds lock poisoned");
        inner.get(cluster).and_then(|e| e.assignment.clone())
    }

    /// Whether a connection currently watches a cluster.
    pub(crate) fn watches(&self, cluster: &str, conn_id: &str) -> bool {
        let inner = self.inner.read().expect("eds lock poisoned");
        inner
            .get(cluster)
            .map(|e| e.connections.contains_key(conn_id))
            .unwrap_or(false)
    }

    /// Watcher count and staleness per cluster, for diagnostics.
    pub(crate) fn snapshot(&self) -> Vec<(String, usize, Option<u64>, usize)> {
        let inner = self.inner.read().expect("eds lock poisoned");
        inner
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    entry.connections.len(),
                    entry.updated_at.map(|t| t.elapsed().as_secs()),
                    entry
                        .assignment
                        .as_ref()
                        .map(|a| a.endpoint_count())
                        .unwrap_or(0),
                )
            })
            .collect()
    }
}
