//! Conformance tests for the helmsman control plane.
//!
//! [`scenarios`] checks the generator contract against concrete mesh
//! fixtures; [`grpc`] drives the full server over a real gRPC transport.

#[cfg(test)]
mod grpc;
#[cfg(test)]
mod scenarios;

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use helmsman_core::ProxyNode;
    use helmsman_model::{
        Labels, MemoryRegistry, NetworkEndpoint, Port, Protocol, Resolution, Service,
        ServiceInstance,
    };

    pub const NODE_ID: &str = "sidecar~10.0.0.5~app.ns~ns.svc.cluster.local";

    pub fn sidecar() -> ProxyNode {
        ProxyNode::parse(NODE_ID).unwrap()
    }

    /// One HTTP service with two live endpoints; the base mesh of the
    /// scenario suite.
    pub fn base_registry() -> Arc<MemoryRegistry> {
        let registry = MemoryRegistry::new();
        registry.add_service(Service {
            hostname: "a.ns.svc.cluster.local".to_string(),
            address: String::new(),
            ports: vec![Port::new("http", 80, Protocol::Http)],
            resolution: Resolution::ClientSideLb,
            mesh_external: false,
        });
        for ip in ["1.1.1.1", "1.1.1.2"] {
            registry.add_instance(ServiceInstance {
                endpoint: NetworkEndpoint {
                    address: ip.to_string(),
                    port: 9080,
                    service_port: Port::new("http", 80, Protocol::Http),
                    locality: None,
                },
                service_hostname: "a.ns.svc.cluster.local".to_string(),
                labels: Labels::new(),
            });
        }
        Arc::new(registry)
    }
}
