//! gRPC service glue and server assembly.
//!
//! [`DiscoveryService`] implements both streaming services over the same
//! machinery: every stream gets a receive helper forwarding requests into a
//! single-slot queue and a stream-loop task driving the state machine. An
//! EDS-only stream is just a stream whose client only ever asks for endpoint
//! assignments.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use helmsman_api::discovery::{DiscoveryRequest, DiscoveryResponse};
use helmsman_api::grpc::aggregated_discovery_service_server::{
    AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
};
use helmsman_api::grpc::endpoint_discovery_service_server::{
    EndpointDiscoveryService, EndpointDiscoveryServiceServer,
};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};

use crate::{shutdown, DiscoveryServer};

/// Stream of discovery responses handed to tonic.
pub type DiscoveryResponseStream = ReceiverStream<Result<DiscoveryResponse, Status>>;

/// The tonic-facing service for both ADS and EDS.
#[derive(Clone)]
pub struct DiscoveryService {
    server: Arc<DiscoveryServer>,
}

impl DiscoveryService {
    /// Wrap a discovery server for serving.
    pub fn new(server: Arc<DiscoveryServer>) -> Self {
        DiscoveryService { server }
    }

    /// Spawn the receive helper and stream loop for a newly accepted stream
    /// and return its response stream.
    fn open_stream(&self, request: Request<Streaming<DiscoveryRequest>>) -> DiscoveryResponseStream {
        let peer_addr = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let mut inbound = request.into_inner();

        let (request_tx, request_rx) = mpsc::channel(1);
        let (response_tx, response_rx) = mpsc::channel(1);

        // Receive helper: the transport read blocks, so it runs apart from
        // the stream loop. Dropping the sender closes the queue, which the
        // loop observes as end-of-stream.
        let recv_peer = peer_addr.clone();
        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(request)) => {
                        if request_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!(peer = %recv_peer, "client closed discovery stream");
                        break;
                    }
                    Err(status) if status.code() == tonic::Code::Cancelled => {
                        info!(peer = %recv_peer, "discovery stream cancelled");
                        break;
                    }
                    Err(status) => {
                        warn!(peer = %recv_peer, error = %status, "discovery stream receive error");
                        break;
                    }
                }
            }
        });

        let server = Arc::clone(&self.server);
        tokio::spawn(async move {
            // Errors are logged and reported to the client inside the loop.
            let _ = crate::stream::handle_stream(server, peer_addr, request_rx, response_tx).await;
        });

        ReceiverStream::new(response_rx)
    }
}

#[async_trait]
impl AggregatedDiscoveryService for DiscoveryService {
    type StreamAggregatedResourcesStream = DiscoveryResponseStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        Ok(Response::new(self.open_stream(request)))
    }
}

#[async_trait]
impl EndpointDiscoveryService for DiscoveryService {
    type StreamEndpointsStream = DiscoveryResponseStream;

    async fn stream_endpoints(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamEndpointsStream>, Status> {
        Ok(Response::new(self.open_stream(request)))
    }
}

impl DiscoveryServer {
    /// Serve ADS, EDS and gRPC health on `addr` until SIGTERM/SIGINT, then
    /// drain for the configured grace period.
    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> Result<(), tonic::transport::Error> {
        let grace_period = self.config().grace_period;
        let (router, mut health) = self.build_router().await;

        info!(addr = %addr, "discovery server listening");
        router
            .serve_with_shutdown(addr, async move {
                shutdown::wait_for_signal().await;
                health
                    .set_not_serving::<AggregatedDiscoveryServiceServer<DiscoveryService>>()
                    .await;
                health
                    .set_not_serving::<EndpointDiscoveryServiceServer<DiscoveryService>>()
                    .await;
                info!(grace_period = ?grace_period, "draining connections");
                tokio::time::sleep(grace_period).await;
            })
            .await
    }

    /// Serve until the given channel fires. No drain period; intended for
    /// embedding and tests.
    pub async fn serve_with_shutdown(
        self: Arc<Self>,
        addr: SocketAddr,
        shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<(), tonic::transport::Error> {
        let (router, _health) = self.build_router().await;
        info!(addr = %addr, "discovery server listening");
        router
            .serve_with_shutdown(addr, async move {
                let _ = shutdown_rx.await;
            })
            .await
    }

    /// Serve on an already-bound listener until the given channel fires.
    /// Useful when the caller needs the ephemeral port.
    pub async fn serve_with_incoming(
        self: Arc<Self>,
        listener: tokio::net::TcpListener,
        shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<(), tonic::transport::Error> {
        let (router, _health) = self.build_router().await;
        router
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                let _ = shutdown_rx.await;
            })
            .await
    }

    async fn build_router(
        self: &Arc<Self>,
    ) -> (
        tonic::transport::server::Router,
        tonic_health::server::HealthReporter,
    ) {
        let service = DiscoveryService::new(Arc::clone(self));
        let (mut health, health_service) = tonic_health::server::health_reporter();
        health
            .set_serving::<AggregatedDiscoveryServiceServer<DiscoveryService>>()
            .await;
        health
            .set_serving::<EndpointDiscoveryServiceServer<DiscoveryService>>()
            .await;

        let router = Server::builder()
            .add_service(AggregatedDiscoveryServiceServer::new(service.clone()))
            .add_service(EndpointDiscoveryServiceServer::new(service))
            .add_service(health_service);
        (router, health)
    }
}
