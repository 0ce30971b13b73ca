//! The read-only facade over the service registry adapter.

use helmsman_core::{ProxyNode, Result};

use crate::config::{DestinationRule, Gateway, MeshConfig, RouteRule};
use crate::service::{Labels, Port, Service, ServiceInstance};

/// Read-only view of the service registry and mesh configuration.
///
/// Implemented by registry adapters (Kubernetes, Consul, a static file,
/// [`crate::MemoryRegistry`]); the discovery server and the generators only
/// ever read through this trait. Registry queries are fallible - adapters
/// talk to remote backends - while config lookups are not.
pub trait Environment: Send + Sync {
    /// All services, ordered by hostname.
    fn services(&self) -> Result<Vec<Service>>;

    /// Instances backing `hostname` on service port `port`, optionally
    /// filtered to those matching `labels`.
    fn instances_by_port(
        &self,
        hostname: &str,
        port: u16,
        labels: Option<&Labels>,
    ) -> Result<Vec<ServiceInstance>>;

    /// Instances co-located with the given proxy (matched by endpoint IP).
    fn proxy_instances(&self, node: &ProxyNode) -> Result<Vec<ServiceInstance>>;

    /// Health/management ports of the workload at `ip`.
    fn management_ports(&self, ip: &str) -> Vec<Port>;

    /// The destination rule for a hostname, if one exists.
    fn destination_rule(&self, hostname: &str) -> Option<DestinationRule>;

    /// Route rules for a hostname, in application order.
    fn route_rules(&self, hostname: &str) -> Vec<RouteRule>;

    /// Total number of route rules known to the registry.
    fn route_rule_count(&self) -> usize {
        0
    }

    /// Gateway definitions bound to the given proxy.
    fn gateways(&self, _node: &ProxyNode) -> Vec<Gateway> {
        Vec::new()
    }

    /// Service accounts authorized to run `hostname`, scoped to a port name.
    fn service_accounts(&self, _hostname: &str, _port_name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Mesh-wide configuration.
    fn mesh(&self) -> MeshConfig;
}
