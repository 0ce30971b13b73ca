//! End-to-end tests over a real gRPC transport.

use std::sync::Arc;
use std::time::Duration;

use helmsman_api::cluster::Cluster;
use helmsman_api::core::Node;
use helmsman_api::discovery::DiscoveryRequest;
use helmsman_api::endpoint::ClusterLoadAssignment;
use helmsman_api::grpc::aggregated_discovery_service_client::AggregatedDiscoveryServiceClient;
use helmsman_api::grpc::endpoint_discovery_service_client::EndpointDiscoveryServiceClient;
use helmsman_core::TypeUrl;
use helmsman_discovery::{DiscoveryConfig, DiscoveryServer};
use helmsman_gen::ConfigGenerator;
use prost::Message;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;

use crate::fixtures::{base_registry, NODE_ID};

const OUTBOUND_CLUSTER: &str = "outbound|80||a.ns.svc.cluster.local";

struct RunningServer {
    server: Arc<DiscoveryServer>,
    addr: std::net::SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<Result<(), tonic::transport::Error>>,
}

async fn start_server() -> RunningServer {
    let server = Arc::new(DiscoveryServer::with_config(
        base_registry(),
        ConfigGenerator::new(),
        DiscoveryConfig {
            push_timeout: Duration::from_millis(200),
            send_timeout: Duration::from_secs(1),
            ..Default::default()
        },
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(Arc::clone(&server).serve_with_incoming(listener, shutdown_rx));

    RunningServer {
        server,
        addr,
        shutdown,
        handle,
    }
}

async fn connect(addr: std::net::SocketAddr) -> Channel {
    let endpoint = Channel::from_shared(format!("http://{addr}")).unwrap();
    for _ in 0..20 {
        if let Ok(channel) = endpoint.connect().await {
            return channel;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server at {addr} never became reachable");
}

fn subscription(type_url: &str, names: &[&str]) -> DiscoveryRequest {
    DiscoveryRequest {
        node: Some(Node {
            id: NODE_ID.to_string(),
            ..Default::default()
        }),
        type_url: type_url.to_string(),
        resource_names: names.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

async fn wait_for_registration(server: &DiscoveryServer) {
    for _ in 0..20 {
        if server.connection_count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("connection never registered");
}

#[tokio::test]
async fn ads_stream_serves_clusters_and_rebroadcasts() {
    let running = start_server().await;
    let channel = connect(running.addr).await;
    let mut client = AggregatedDiscoveryServiceClient::new(channel);

    let (request_tx, request_rx) = mpsc::channel(4);
    let mut inbound = client
        .stream_aggregated_resources(ReceiverStream::new(request_rx))
        .await
        .unwrap()
        .into_inner();

    request_tx
        .send(subscription(TypeUrl::CLUSTER, &[]))
        .await
        .unwrap();

    let response = inbound.message().await.unwrap().unwrap();
    assert_eq!(response.type_url, TypeUrl::CLUSTER);
    assert!(!response.nonce.is_empty());

    let first = Cluster::decode(response.resources[0].value.as_slice()).unwrap();
    assert!(!first.name.is_empty());
    let names: Vec<String> = response
        .resources
        .iter()
        .map(|r| Cluster::decode(r.value.as_slice()).unwrap().name)
        .collect();
    assert!(names.contains(&OUTBOUND_CLUSTER.to_string()));

    // ACK, then force a broadcast; the watch delivers a fresh CDS response.
    request_tx
        .send(DiscoveryRequest {
            response_nonce: response.nonce.clone(),
            version_info: response.version_info.clone(),
            ..subscription(TypeUrl::CLUSTER, &[])
        })
        .await
        .unwrap();

    wait_for_registration(&running.server).await;
    running.server.broadcast().await;

    let pushed = inbound.message().await.unwrap().unwrap();
    assert_eq!(pushed.type_url, TypeUrl::CLUSTER);
    assert_ne!(pushed.nonce, response.nonce);

    let diag = running.server.diagnostics();
    assert_eq!(diag.connections.len(), 1);
    assert!(diag.connections[0].cds_watched);

    drop(request_tx);
    running.shutdown.send(()).unwrap();
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn eds_stream_serves_endpoint_assignments() {
    let running = start_server().await;
    let channel = connect(running.addr).await;
    let mut client = EndpointDiscoveryServiceClient::new(channel);

    let (request_tx, request_rx) = mpsc::channel(4);
    let mut inbound = client
        .stream_endpoints(ReceiverStream::new(request_rx))
        .await
        .unwrap()
        .into_inner();

    request_tx
        .send(subscription(TypeUrl::ENDPOINT, &[OUTBOUND_CLUSTER]))
        .await
        .unwrap();

    let response = inbound.message().await.unwrap().unwrap();
    assert_eq!(response.type_url, TypeUrl::ENDPOINT);
    assert_eq!(response.resources.len(), 1);

    let assignment =
        ClusterLoadAssignment::decode(response.resources[0].value.as_slice()).unwrap();
    assert_eq!(assignment.cluster_name, OUTBOUND_CLUSTER);
    assert_eq!(assignment.endpoint_count(), 2);

    drop(request_tx);
    running.shutdown.send(()).unwrap();
    running.handle.await.unwrap().unwrap();
}
