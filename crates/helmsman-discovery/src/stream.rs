//! The per-connection stream loop.
//!
//! One loop per bidirectional stream. A receive helper (in [`crate::service`])
//! forwards inbound requests into a single-slot queue; the loop selects over
//! that queue and the connection's push channel. Inbound requests either
//! initiate a watch, change a watched name set, or acknowledge a previous
//! response. Push signals re-send every watched resource type in the order
//! CDS, RDS, EDS, LDS.

use std::sync::Arc;

use helmsman_api::cluster::Cluster;
use helmsman_api::discovery::{DiscoveryRequest, DiscoveryResponse};
use helmsman_api::endpoint::ClusterLoadAssignment;
use helmsman_api::listener::Listener;
use helmsman_api::pack_any;
use helmsman_api::route::RouteConfiguration;
use helmsman_core::version;
use helmsman_core::{Error, ProxyNode, Result, TypeUrl};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tonic::Status;
use tracing::{debug, info, warn};

use crate::connection::XdsConnection;
use crate::DiscoveryServer;

pub(crate) type ResponseSender = mpsc::Sender<std::result::Result<DiscoveryResponse, Status>>;

/// Drive one stream to completion. Returns when the remote side closes, the
/// stream is cancelled, or a fatal error occurs; teardown always runs.
pub(crate) async fn handle_stream(
    server: Arc<DiscoveryServer>,
    peer_addr: String,
    mut requests: mpsc::Receiver<DiscoveryRequest>,
    responses: ResponseSender,
) -> Result<()> {
    let (conn, mut push_rx) = XdsConnection::new(peer_addr);
    let conn = Arc::new(conn);

    info!(peer = %conn.peer_addr(), "discovery stream started");

    let result = loop {
        tokio::select! {
            maybe_request = requests.recv() => {
                match maybe_request {
                    Some(request) => {
                        if let Err(err) = handle_request(&server, &conn, request, &responses).await {
                            break Err(err);
                        }
                    }
                    // Queue closed: the receive helper observed EOF or a
                    // transport error.
                    None => break Ok(()),
                }
            }
            maybe_event = push_rx.recv() => {
                if maybe_event.is_none() {
                    break Ok(());
                }
                if let Err(err) = push_all(&server, &conn, &responses).await {
                    break Err(err);
                }
            }
        }
    };

    // Teardown: signal done, then drop out of both indexes.
    conn.close();
    if conn.is_added() {
        let clusters = conn.watch_state().clusters;
        server.eds().remove_connection(&clusters, conn.conn_id());
        server.registry().remove(&conn);
    }

    match &result {
        Ok(()) => {
            info!(conn = %conn.conn_id(), peer = %conn.peer_addr(), "discovery stream ended");
        }
        Err(err) => {
            warn!(
                conn = %conn.conn_id(),
                peer = %conn.peer_addr(),
                error = %err,
                "discovery stream ended with error"
            );
            let _ = responses.try_send(Err(err.to_status()));
        }
    }
    result
}

async fn handle_request(
    server: &Arc<DiscoveryServer>,
    conn: &Arc<XdsConnection>,
    request: DiscoveryRequest,
    responses: &ResponseSender,
) -> Result<()> {
    if conn.node().is_none() {
        let node_id = request.node_id().unwrap_or("");
        if node_id.is_empty() {
            info!(peer = %conn.peer_addr(), "discovery request without node id, skipping");
            return Ok(());
        }
        // Malformed ids are fatal; a proxy that cannot identify itself
        // cannot be configured.
        let mut node = ProxyNode::parse(node_id)?;
        node.metadata = ProxyNode::parse_metadata(
            request.node.as_ref().and_then(|n| n.metadata.as_ref()),
        );
        let conn_id = server.next_conn_id(&node.id);
        debug!(conn = %conn_id, node = %node, "node identified");
        conn.set_identity(node, conn_id);
    }

    match request.type_url.as_str() {
        TypeUrl::CLUSTER => {
            if conn.watch_state().cds_watched {
                record_nack(server, conn, &request, TypeUrl::CLUSTER);
                debug!(conn = %conn.conn_id(), nonce = %request.response_nonce, "CDS ACK");
            } else {
                info!(conn = %conn.conn_id(), peer = %conn.peer_addr(), "CDS watch initiated");
                conn.set_cds_watched();
                push_cds(server, conn, responses).await?;
            }
        }
        TypeUrl::LISTENER => {
            if conn.watch_state().lds_watched {
                record_nack(server, conn, &request, TypeUrl::LISTENER);
                debug!(conn = %conn.conn_id(), nonce = %request.response_nonce, "LDS ACK");
            } else {
                info!(conn = %conn.conn_id(), peer = %conn.peer_addr(), "LDS watch initiated");
                conn.set_lds_watched();
                push_lds(server, conn, responses).await?;
            }
        }
        TypeUrl::ROUTE => {
            let current = conn.watch_state().routes;
            if request.resource_names == current {
                if request.is_nack() {
                    warn!(
                        conn = %conn.conn_id(),
                        error = %nack_message(&request),
                        "RDS ACK carries an error"
                    );
                }
                debug!(
                    conn = %conn.conn_id(),
                    version = %request.version_info,
                    nonce = %request.response_nonce,
                    "RDS ACK"
                );
            } else {
                conn.set_routes(request.resource_names.clone());
                info!(
                    conn = %conn.conn_id(),
                    routes = request.resource_names.len(),
                    "RDS watch updated"
                );
                push_rds(server, conn, responses).await?;
            }
        }
        TypeUrl::ENDPOINT => {
            let current = conn.watch_state().clusters;
            if request.resource_names == current {
                record_nack(server, conn, &request, TypeUrl::ENDPOINT);
                debug!(
                    conn = %conn.conn_id(),
                    version = %request.version_info,
                    nonce = %request.response_nonce,
                    "EDS ACK"
                );
            } else {
                let requested = request.resource_names.clone();
                for added in requested.iter().filter(|c| !current.contains(c)) {
                    server.eds().add(added, conn.conn_id(), Arc::clone(conn));
                }
                for dropped in current.iter().filter(|c| !requested.contains(c)) {
                    server.eds().remove(dropped, conn.conn_id());
                }
                conn.set_clusters(requested);
                info!(
                    conn = %conn.conn_id(),
                    clusters = conn.watch_state().clusters.len(),
                    "EDS watch updated"
                );
                push_eds(server, conn, responses).await?;
            }
        }
        other => {
            warn!(conn = %conn.conn_id(), type_url = %other, "ignoring unknown resource type");
        }
    }

    if !conn.is_added() {
        conn.mark_added();
        server.registry().add(Arc::clone(conn));
    }
    Ok(())
}

fn record_nack(
    server: &DiscoveryServer,
    conn: &XdsConnection,
    request: &DiscoveryRequest,
    type_url: &str,
) {
    if request.is_nack() {
        let message = nack_message(request);
        let node_id = conn.node().map(|n| n.id.as_str()).unwrap_or("");
        warn!(
            conn = %conn.conn_id(),
            type_url = %type_url,
            error = %message,
            "client rejected configuration"
        );
        server.metrics().record_reject(type_url, node_id, &message);
    }
}

fn nack_message(request: &DiscoveryRequest) -> String {
    request
        .error_detail
        .as_ref()
        .map(|d| d.message.clone())
        .unwrap_or_default()
}

/// Re-push every watched resource type, in the order CDS, RDS, EDS, LDS.
pub(crate) async fn push_all(
    server: &Arc<DiscoveryServer>,
    conn: &Arc<XdsConnection>,
    responses: &ResponseSender,
) -> Result<()> {
    let watch = conn.watch_state();
    if watch.cds_watched {
        push_cds(server, conn, responses).await?;
    }
    if !watch.routes.is_empty() {
        push_rds(server, conn, responses).await?;
    }
    if !watch.clusters.is_empty() {
        push_eds(server, conn, responses).await?;
    }
    if watch.lds_watched {
        push_lds(server, conn, responses).await?;
    }
    Ok(())
}

async fn push_cds(
    server: &Arc<DiscoveryServer>,
    conn: &Arc<XdsConnection>,
    responses: &ResponseSender,
) -> Result<()> {
    let node = conn.node().ok_or(Error::MissingNode)?;
    let clusters = match server.generator().build_clusters(server.env(), node) {
        Ok(clusters) => clusters,
        Err(err) => {
            // Generation failures abandon this push only; the next broadcast
            // retries with a hopefully healthier registry.
            warn!(conn = %conn.conn_id(), error = %err, "CDS generation failed");
            server.metrics().record_push_error("cds_builderr");
            return Ok(());
        }
    };

    let resources = clusters
        .iter()
        .map(|c| pack_any(Cluster::TYPE_URL, c))
        .collect();
    let count = clusters.len();
    conn.retain_clusters(clusters);

    send_response(server, responses, discovery_response(TypeUrl::CLUSTER, resources)).await?;
    server.metrics().record_push("cds");
    info!(conn = %conn.conn_id(), clusters = count, "CDS push");
    Ok(())
}

async fn push_lds(
    server: &Arc<DiscoveryServer>,
    conn: &Arc<XdsConnection>,
    responses: &ResponseSender,
) -> Result<()> {
    let node = conn.node().ok_or(Error::MissingNode)?;
    let listeners = match server.generator().build_listeners(server.env(), node) {
        Ok(listeners) => listeners,
        Err(err) => {
            warn!(conn = %conn.conn_id(), error = %err, "LDS generation failed");
            server.metrics().record_push_error("lds_builderr");
            return Ok(());
        }
    };

    let resources = listeners
        .iter()
        .map(|l| pack_any(Listener::TYPE_URL, l))
        .collect();
    let count = listeners.len();
    conn.retain_listeners(listeners);

    send_response(server, responses, discovery_response(TypeUrl::LISTENER, resources)).await?;
    server.metrics().record_push("lds");
    info!(conn = %conn.conn_id(), listeners = count, "LDS push");
    Ok(())
}

async fn push_rds(
    server: &Arc<DiscoveryServer>,
    conn: &Arc<XdsConnection>,
    responses: &ResponseSender,
) -> Result<()> {
    let node = conn.node().ok_or(Error::MissingNode)?;
    let routes = conn.watch_state().routes;

    let mut configs = Vec::with_capacity(routes.len());
    for route_name in &routes {
        match server.generator().build_route_config(server.env(), node, route_name) {
            Ok(config) => configs.push(config),
            Err(err) => {
                warn!(
                    conn = %conn.conn_id(),
                    route = %route_name,
                    error = %err,
                    "RDS generation failed"
                );
                server.metrics().record_push_error("rds_builderr");
                return Ok(());
            }
        }
    }

    let resources = configs
        .iter()
        .map(|r| pack_any(RouteConfiguration::TYPE_URL, r))
        .collect();
    let count = configs.len();
    conn.retain_route_configs(configs);

    send_response(server, responses, discovery_response(TypeUrl::ROUTE, resources)).await?;
    server.metrics().record_push("rds");
    info!(conn = %conn.conn_id(), routes = count, "RDS push");
    Ok(())
}

async fn push_eds(
    server: &Arc<DiscoveryServer>,
    conn: &Arc<XdsConnection>,
    responses: &ResponseSender,
) -> Result<()> {
    let clusters = conn.watch_state().clusters;

    let mut resources = Vec::with_capacity(clusters.len());
    for cluster in &clusters {
        // The broadcast loop refreshes assignments once per change; compute
        // lazily only for clusters it has not seen yet.
        let assignment = match server.eds().assignment(cluster) {
            Some(assignment) => assignment,
            None => match server.generator().build_endpoint(server.env(), cluster) {
                Ok(assignment) => server.eds().set_assignment(cluster, assignment),
                Err(err) => {
                    warn!(
                        conn = %conn.conn_id(),
                        cluster = %cluster,
                        error = %err,
                        "EDS generation failed"
                    );
                    server.metrics().record_push_error("eds_builderr");
                    return Ok(());
                }
            },
        };
        resources.push(pack_any(ClusterLoadAssignment::TYPE_URL, assignment.as_ref()));
    }

    let count = resources.len();
    send_response(server, responses, discovery_response(TypeUrl::ENDPOINT, resources)).await?;
    server.metrics().record_push("eds");
    info!(conn = %conn.conn_id(), clusters = count, "EDS push");
    Ok(())
}

/// Send with the write watchdog. A client that is not reading trips the
/// timeout; both the timeout and a closed channel are fatal to the stream.
async fn send_response(
    server: &DiscoveryServer,
    responses: &ResponseSender,
    response: DiscoveryResponse,
) -> Result<()> {
    let send_timeout = server.config().send_timeout;
    match timeout(send_timeout, responses.send(Ok(response))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(Error::StreamClosed {
            reason: "response channel closed".to_string(),
        }),
        Err(_) => {
            server.metrics().record_write_timeout();
            Err(Error::SendTimeout(send_timeout))
        }
    }
}

fn discovery_response(type_url: &str, resources: Vec<prost_types::Any>) -> DiscoveryResponse {
    DiscoveryResponse {
        version_info: version::version_info(),
        resources,
        canary: false,
        type_url: type_url.to_string(),
        nonce: version::nonce(),
    }
}
