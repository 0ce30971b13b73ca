//! In-memory registry for tests and embedding.

use std::collections::HashMap;
use std::sync::RwLock;

use helmsman_core::{ProxyNode, Result};
use tracing::warn;

use crate::config::{DestinationRule, Gateway, MeshConfig, RouteRule};
use crate::environment::Environment;
use crate::service::{labels_match, Labels, Port, Service, ServiceInstance};

/// A mutable, in-process implementation of [`Environment`].
///
/// Services, instances and rules are added imperatively; reads see a
/// consistent snapshot under an internal lock. Useful as the registry for
/// tests and for embedders that drive the mesh model from their own source.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    services: HashMap<String, Service>,
    instances: Vec<ServiceInstance>,
    management_ports: HashMap<String, Vec<Port>>,
    destination_rules: HashMap<String, DestinationRule>,
    route_rules: Vec<RouteRule>,
    gateways: Vec<Gateway>,
    service_accounts: HashMap<String, Vec<String>>,
    mesh: MeshConfig,
}

impl MemoryRegistry {
    /// Create an empty registry with default mesh config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with the given mesh config.
    pub fn with_mesh(mesh: MeshConfig) -> Self {
        MemoryRegistry {
            inner: RwLock::new(Inner {
                mesh,
                ..Default::default()
            }),
        }
    }

    /// Add or extend a service. Ports already present on the service are
    /// kept; a port re-added with a different protocol is rejected with a
    /// warning, matching how registry adapters reconcile conflicting
    /// definitions.
    pub fn add_service(&self, service: Service) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        match inner.services.get_mut(&service.hostname) {
            Some(existing) => {
                for port in service.ports {
                    if let Some(prev) = existing.ports.iter().find(|p| p.port == port.port) {
                        if prev.protocol != port.protocol {
                            warn!(
                                hostname = %service.hostname,
                                port = port.port,
                                previous = %prev.protocol,
                                conflicting = %port.protocol,
                                "conflicting protocol definitions for service port"
                            );
                        }
                        continue;
                    }
                    existing.ports.push(port);
                }
            }
            None => {
                inner.services.insert(service.hostname.clone(), service);
            }
        }
    }

    /// Add a service instance.
    pub fn add_instance(&self, instance: ServiceInstance) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.instances.push(instance);
    }

    /// Remove all instances of a hostname (used to simulate scale-down).
    pub fn clear_instances(&self, hostname: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.instances.retain(|i| i.service_hostname != hostname);
    }

    /// Declare management ports for the workload at `ip`.
    pub fn set_management_ports(&self, ip: impl Into<String>, ports: Vec<Port>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.management_ports.insert(ip.into(), ports);
    }

    /// Install a destination rule, replacing any existing rule for the host.
    pub fn set_destination_rule(&self, rule: DestinationRule) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.destination_rules.insert(rule.host.clone(), rule);
    }

    /// Append a route rule.
    pub fn add_route_rule(&self, rule: RouteRule) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.route_rules.push(rule);
    }

    /// Append a gateway definition.
    pub fn add_gateway(&self, gateway: Gateway) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.gateways.push(gateway);
    }

    /// Declare the service accounts for a hostname.
    pub fn set_service_accounts(&self, hostname: impl Into<String>, accounts: Vec<String>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.service_accounts.insert(hostname.into(), accounts);
    }

    /// Replace the mesh config.
    pub fn set_mesh(&self, mesh: MeshConfig) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.mesh = mesh;
    }
}

impl Environment for MemoryRegistry {
    fn services(&self) -> Result<Vec<Service>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut services: Vec<Service> = inner.services.values().cloned().collect();
        services.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(services)
    }

    fn instances_by_port(
        &self,
        hostname: &str,
        port: u16,
        labels: Option<&Labels>,
    ) -> Result<Vec<ServiceInstance>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        Ok(inner
            .instances
            .iter()
            .filter(|i| i.service_hostname == hostname && i.endpoint.service_port.port == port)
            .filter(|i| labels.map(|sel| labels_match(sel, &i.labels)).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn proxy_instances(&self, node: &ProxyNode) -> Result<Vec<ServiceInstance>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        Ok(inner
            .instances
            .iter()
            .filter(|i| i.endpoint.address == node.ip)
            .cloned()
            .collect())
    }

    fn management_ports(&self, ip: &str) -> Vec<Port> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.management_ports.get(ip).cloned().unwrap_or_default()
    }

    fn destination_rule(&self, hostname: &str) -> Option<DestinationRule> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.destination_rules.get(hostname).cloned()
    }

    fn route_rules(&self, hostname: &str) -> Vec<RouteRule> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .route_rules
            .iter()
            .filter(|r| r.hostname == hostname)
            .cloned()
            .collect()
    }

    fn route_rule_count(&self) -> usize {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.route_rules.len()
    }

    fn gateways(&self, _node: &ProxyNode) -> Vec<Gateway> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.gateways.clone()
    }

    fn service_accounts(&self, hostname: &str, _port_name: &str) -> Vec<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .service_accounts
            .get(hostname)
            .cloned()
            .unwrap_or_default()
    }

    fn mesh(&self) -> MeshConfig {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.mesh.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{NetworkEndpoint, Protocol, Resolution};

    fn service(hostname: &str, ports: Vec<Port>) -> Service {
        Service {
            hostname: hostname.to_string(),
            address: String::new(),
            ports,
            resolution: Resolution::ClientSideLb,
            mesh_external: false,
        }
    }

    fn instance(hostname: &str, ip: &str, port: Port) -> ServiceInstance {
        ServiceInstance {
            endpoint: NetworkEndpoint {
                address: ip.to_string(),
                port: 9080,
                service_port: port,
                locality: None,
            },
            service_hostname: hostname.to_string(),
            labels: Labels::new(),
        }
    }

    #[test]
    fn services_sorted_by_hostname() {
        let registry = MemoryRegistry::new();
        registry.add_service(service("b.default.svc.cluster.local", vec![]));
        registry.add_service(service("a.default.svc.cluster.local", vec![]));

        let services = registry.services().unwrap();
        assert_eq!(services[0].hostname, "a.default.svc.cluster.local");
        assert_eq!(services[1].hostname, "b.default.svc.cluster.local");
    }

    #[test]
    fn duplicate_port_is_deduplicated() {
        let registry = MemoryRegistry::new();
        let http = Port::new("http", 80, Protocol::Http);
        registry.add_service(service("a.local", vec![http.clone()]));
        registry.add_service(service("a.local", vec![http.clone(), Port::new("tcp", 81, Protocol::Tcp)]));

        let services = registry.services().unwrap();
        assert_eq!(services[0].ports.len(), 2);
    }

    #[test]
    fn instances_filter_by_port_and_labels() {
        let registry = MemoryRegistry::new();
        let http = Port::new("http", 80, Protocol::Http);
        let mut v1 = instance("a.local", "1.1.1.1", http.clone());
        v1.labels.insert("version".to_string(), "v1".to_string());
        let mut v2 = instance("a.local", "1.1.1.2", http.clone());
        v2.labels.insert("version".to_string(), "v2".to_string());
        registry.add_instance(v1);
        registry.add_instance(v2);

        let all = registry.instances_by_port("a.local", 80, None).unwrap();
        assert_eq!(all.len(), 2);

        let mut selector = Labels::new();
        selector.insert("version".to_string(), "v1".to_string());
        let only_v1 = registry
            .instances_by_port("a.local", 80, Some(&selector))
            .unwrap();
        assert_eq!(only_v1.len(), 1);
        assert_eq!(only_v1[0].endpoint.address, "1.1.1.1");
    }

    #[test]
    fn proxy_instances_match_by_ip() {
        let registry = MemoryRegistry::new();
        let http = Port::new("http", 80, Protocol::Http);
        registry.add_instance(instance("a.local", "10.0.0.5", http.clone()));
        registry.add_instance(instance("a.local", "10.0.0.6", http));

        let node = ProxyNode::parse("sidecar~10.0.0.5~a.default~default.svc.cluster.local").unwrap();
        let local = registry.proxy_instances(&node).unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].endpoint.address, "10.0.0.5");
    }
}
