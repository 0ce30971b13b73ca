//! Per-stream connection state.
//!
//! One [`XdsConnection`] exists per live stream. Its watch state is mutated
//! only by the stream loop that owns it; the broadcast loop signals the push
//! channel and reads state after the signal is delivered, which happens
//! before the loop's next mutation. Push bookkeeping (`last_push`,
//! `last_push_failure`) is written by the broadcast loop under its own lock.

use std::sync::{Mutex, OnceLock, RwLock};
use std::time::{Duration, Instant, SystemTime};

use helmsman_api::cluster::Cluster;
use helmsman_api::listener::Listener;
use helmsman_api::route::RouteConfiguration;
use helmsman_core::ProxyNode;
use tokio::sync::{mpsc, watch};

/// Signal that configuration changed and the connection should re-push.
///
/// The channel has capacity one: a pending event already covers any change
/// that arrives while it is queued.
#[derive(Debug, Default)]
pub struct PushEvent {}

/// Watch state for one connection, owned by its stream loop.
#[derive(Debug, Default, Clone)]
pub struct WatchState {
    /// Set once the first Cluster request arrives.
    pub cds_watched: bool,
    /// Set once the first Listener request arrives.
    pub lds_watched: bool,
    /// Route config names from the last RDS request.
    pub routes: Vec<String>,
    /// Cluster names from the last EDS request.
    pub clusters: Vec<String>,
}

/// Last pushed payloads, retained for operator diagnostics.
#[derive(Debug, Default, Clone)]
pub struct LastSent {
    /// Listeners from the last LDS push.
    pub listeners: Vec<Listener>,
    /// Route configs from the last RDS push, in watch order.
    pub route_configs: Vec<RouteConfiguration>,
    /// Clusters from the last CDS push.
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Default)]
struct PushStatus {
    last_push: Option<Instant>,
    last_push_failure: Option<Instant>,
}

/// Outcome of recording a failed push signal.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PushFailure {
    /// First failure since the last successful push.
    First,
    /// Failing, but not for long yet.
    Recent,
    /// Stuck for at least the long-warn threshold.
    Stuck(Duration),
}

/// A live client connection.
pub struct XdsConnection {
    peer_addr: String,
    connected_at: SystemTime,
    /// Set on the first request; invariant afterwards.
    node: OnceLock<ProxyNode>,
    /// Set together with the node on the first request.
    conn_id: OnceLock<String>,
    watch: RwLock<WatchState>,
    last_sent: RwLock<LastSent>,
    push_status: Mutex<PushStatus>,
    push_tx: mpsc::Sender<PushEvent>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    /// Whether this connection has been inserted into the client registry.
    added: Mutex<bool>,
}

impl XdsConnection {
    /// Create a connection and hand back the receive side of its push
    /// channel, owned by the stream loop.
    pub fn new(peer_addr: impl Into<String>) -> (Self, mpsc::Receiver<PushEvent>) {
        let (push_tx, push_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(false);
        let conn = XdsConnection {
            peer_addr: peer_addr.into(),
            connected_at: SystemTime::now(),
            node: OnceLock::new(),
            conn_id: OnceLock::new(),
            watch: RwLock::new(WatchState::default()),
            last_sent: RwLock::new(LastSent::default()),
            push_status: Mutex::new(PushStatus::default()),
            push_tx,
            done_tx,
            done_rx,
            added: Mutex::new(false),
        };
        (conn, push_rx)
    }

    /// Transport-layer address of the client.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// When the stream was accepted.
    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// The parsed node identity, once the first request arrived.
    pub fn node(&self) -> Option<&ProxyNode> {
        self.node.get()
    }

    /// The connection id, once assigned.
    pub fn conn_id(&self) -> &str {
        self.conn_id.get().map(String::as_str).unwrap_or("")
    }

    /// Assign identity on the first request. Later calls are no-ops; the
    /// identity is invariant for the connection's lifetime.
    pub(crate) fn set_identity(&self, node: ProxyNode, conn_id: String) {
        let _ = self.node.set(node);
        let _ = self.conn_id.set(conn_id);
    }

    /// Current watch state (cloned).
    pub fn watch_state(&self) -> WatchState {
        self.watch.read().expect("watch lock poisoned").clone()
    }

    pub(crate) fn set_cds_watched(&self) {
        self.watch.write().expect("watch lock poisoned").cds_watched = true;
    }

    pub(crate) fn set_lds_watched(&self) {
        self.watch.write().expect("watch lock poisoned").lds_watched = true;
    }

    pub(crate) fn set_routes(&self, routes: Vec<String>) {
        self.watch.write().expect("watch lock poisoned").routes = routes;
    }

    pub(crate) fn set_clusters(&self, clusters: Vec<String>) {
        self.watch.write().expect("watch lock poisoned").clusters = clusters;
    }

    /// Last pushed payloads (cloned), for diagnostics.
    pub fn last_sent(&self) -> LastSent {
        self.last_sent.read().expect("last-sent lock poisoned").clone()
    }

    pub(crate) fn retain_clusters(&self, clusters: Vec<Cluster>) {
        self.last_sent.write().expect("last-sent lock poisoned").clusters = clusters;
    }

    pub(crate) fn retain_listeners(&self, listeners: Vec<Listener>) {
        self.last_sent.write().expect("last-sent lock poisoned").listeners = listeners;
    }

    pub(crate) fn retain_route_configs(&self, configs: Vec<RouteConfiguration>) {
        self.last_sent.write().expect("last-sent lock poisoned").route_configs = configs;
    }

    /// Sender half of the push channel, used by the broadcast loop.
    pub(crate) fn push_sender(&self) -> &mpsc::Sender<PushEvent> {
        &self.push_tx
    }

    /// A receiver resolving once the stream has terminated.
    pub(crate) fn done_receiver(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }

    /// Mark the stream terminated. Closes the done channel exactly once; the
    /// push channel is deliberately left open (closing it races with the
    /// broadcast loop's send).
    pub(crate) fn close(&self) {
        let _ = self.done_tx.send(true);
    }

    /// Whether the stream has terminated.
    pub fn is_closed(&self) -> bool {
        *self.done_rx.borrow()
    }

    pub(crate) fn record_push_ok(&self) {
        let mut status = self.push_status.lock().expect("push-status lock poisoned");
        status.last_push = Some(Instant::now());
        status.last_push_failure = None;
    }

    /// Record a failed push signal and classify it against the long-warn
    /// threshold.
    pub(crate) fn record_push_failure(&self, long_threshold: Duration) -> PushFailure {
        let mut status = self.push_status.lock().expect("push-status lock poisoned");
        match status.last_push_failure {
            None => {
                status.last_push_failure = Some(Instant::now());
                PushFailure::First
            }
            Some(since) if since.elapsed() >= long_threshold => PushFailure::Stuck(since.elapsed()),
            Some(_) => PushFailure::Recent,
        }
    }

    /// Seconds since the last successful push, if any.
    pub fn seconds_since_last_push(&self) -> Option<u64> {
        self.push_status
            .lock()
            .expect("push-status lock poisoned")
            .last_push
            .map(|t| t.elapsed().as_secs())
    }

    /// Whether a push failure is currently outstanding.
    pub fn push_failing(&self) -> bool {
        self.push_status
            .lock()
            .expect("push-status lock poisoned")
            .last_push_failure
            .is_some()
    }

    pub(crate) fn mark_added(&self) -> bool {
        let mut added = self.added.lock().expect("added lock poisoned");
        let first = !*added;
        *added = true;
        first
    }

    pub(crate) fn is_added(&self) -> bool {
        *self.added.lock().expect("added lock poisoned")
    }
}

impl std::fmt::Debug for XdsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XdsConnection")
            .field("conn_id", &self.conn_id())
            .field("peer_addr", &self.peer_addr)
            .field("node", &self.node.get().map(|n| n.service_node()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_write_once() {
        let (conn, _rx) = XdsConnection::new("1.2.3.4:5678");
        let node =
            ProxyNode::parse("sidecar~10.0.0.5~app.default~default.svc.cluster.local").unwrap();
        conn.set_identity(node.clone(), "app.default-1".to_string());
        conn.set_identity(
            ProxyNode::parse("router~1.1.1.1~other~domain").unwrap(),
            "other-2".to_string(),
        );

        assert_eq!(conn.conn_id(), "app.default-1");
        assert_eq!(conn.node().unwrap().ip, "10.0.0.5");
    }

    #[test]
    fn push_failure_classification() {
        let (conn, _rx) = XdsConnection::new("peer");
        assert_eq!(
            conn.record_push_failure(Duration::from_secs(10)),
            PushFailure::First
        );
        assert_eq!(
            conn.record_push_failure(Duration::from_secs(10)),
            PushFailure::Recent
        );
        // With a zero threshold the second failure is already stuck.
        assert!(matches!(
            conn.record_push_failure(Duration::ZERO),
            PushFailure::Stuck(_)
        ));

        conn.record_push_ok();
        assert!(!conn.push_failing());
        assert_eq!(
            conn.record_push_failure(Duration::from_secs(10)),
            PushFailure::First
        );
    }

    #[test]
    fn close_is_observable_and_idempotent() {
        let (conn, _rx) = XdsConnection::new("peer");
        assert!(!conn.is_closed());
        conn.close();
        conn.close();
        assert!(conn.is_closed());
    }

    #[test]
    fn mark_added_reports_first_transition() {
        let (conn, _rx) = XdsConnection::new("peer");
        assert!(!conn.is_added());
        assert!(conn.mark_added());
        assert!(!conn.mark_added());
        assert!(conn.is_added());
    }
}
