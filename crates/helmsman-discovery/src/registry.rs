//! Process-wide index of live connections.
//!
//! Two indexes under one reader/writer lock: the primary keyed by connection
//! id, and a node-id multimap. The multimap exists because a restarting
//! proxy's new stream can arrive before the old stream's EOF propagates;
//! both connections coexist until the old one is torn down.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, error};

use crate::connection::XdsConnection;
use crate::metrics::DiscoveryMetrics;

pub(crate) struct ClientRegistry {
    inner: RwLock<Inner>,
    metrics: Arc<DiscoveryMetrics>,
}

#[derive(Default)]
struct Inner {
    by_conn: HashMap<String, Arc<XdsConnection>>,
    by_node: HashMap<String, HashMap<String, Arc<XdsConnection>>>,
}

impl ClientRegistry {
    pub(crate) fn new(metrics: Arc<DiscoveryMetrics>) -> Self {
        ClientRegistry {
            inner: RwLock::new(Inner::default()),
            metrics,
        }
    }

    /// Insert a connection under both indexes. Idempotent by connection id.
    pub(crate) fn add(&self, conn: Arc<XdsConnection>) {
        let conn_id = conn.conn_id().to_string();
        debug_assert!(!conn_id.is_empty(), "connection registered without identity");

        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(node) = conn.node() {
            inner
                .by_node
                .entry(node.id.clone())
                .or_default()
                .insert(conn_id.clone(), Arc::clone(&conn));
        }
        inner.by_conn.insert(conn_id.clone(), conn);
        self.metrics.set_active_connections(inner.by_conn.len());
        debug!(conn = %conn_id, total = inner.by_conn.len(), "connection registered");
    }

    /// Remove a connection from both indexes. A missing primary entry is
    /// logged and tolerated so duplicate teardown paths stay harmless.
    pub(crate) fn remove(&self, conn: &XdsConnection) {
        let conn_id = conn.conn_id();
        let mut inner = self.inner.write().expect("registry lock poisoned");

        if inner.by_conn.remove(conn_id).is_none() {
            error!(conn = %conn_id, "removing connection that is not registered");
        }
        if let Some(node) = conn.node() {
            if let Some(conns) = inner.by_node.get_mut(&node.id) {
                conns.remove(conn_id);
                if conns.is_empty() {
                    inner.by_node.remove(&node.id);
                }
            }
        }
        self.metrics.set_active_connections(inner.by_conn.len());
        debug!(conn = %conn_id, total = inner.by_conn.len(), "connection removed");
    }

    /// Snapshot every live connection. Taken under the read lock and
    /// released before any per-connection work.
    pub(crate) fn snapshot(&self) -> Vec<Arc<XdsConnection>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.by_conn.values().cloned().collect()
    }

    /// Look up a connection by id.
    pub(crate) fn get(&self, conn_id: &str) -> Option<Arc<XdsConnection>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.by_conn.get(conn_id).cloned()
    }

    /// All live connections for a node id.
    pub(crate) fn for_node(&self, node_id: &str) -> Vec<Arc<XdsConnection>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .by_node
            .get(node_id)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.by_conn.len()
    }
}
