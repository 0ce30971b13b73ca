//! Services, ports, instances and their labels.

use std::collections::BTreeMap;
use std::fmt;

/// Application protocol of a service port.
///
/// The protocol decides which listener family a port produces: HTTP-class
/// ports get an HTTP connection manager and RDS routes, TCP-class ports get
/// a TCP proxy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain HTTP/1.1.
    Http,
    /// HTTP/2 without gRPC semantics.
    Http2,
    /// gRPC over HTTP/2.
    Grpc,
    /// TLS-wrapped HTTP; routed as TCP with optional SNI matching.
    Https,
    /// Opaque TCP.
    Tcp,
    /// TLS-wrapped opaque TCP.
    Tls,
    /// MongoDB wire protocol; treated as TCP.
    Mongo,
    /// Redis wire protocol; treated as TCP.
    Redis,
    /// UDP; no listener support.
    Udp,
    /// Anything we cannot classify.
    Unsupported,
}

impl Protocol {
    /// Parse a protocol from its port-name spelling (case-insensitive).
    pub fn parse(s: &str) -> Protocol {
        match s.to_ascii_lowercase().as_str() {
            "http" => Protocol::Http,
            "http2" => Protocol::Http2,
            "grpc" => Protocol::Grpc,
            "https" => Protocol::Https,
            "tcp" => Protocol::Tcp,
            "tls" => Protocol::Tls,
            "mongo" => Protocol::Mongo,
            "redis" => Protocol::Redis,
            "udp" => Protocol::Udp,
            _ => Protocol::Unsupported,
        }
    }

    /// Whether this port is served by an HTTP connection manager.
    pub fn is_http(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Http2 | Protocol::Grpc)
    }

    /// Whether the upstream speaks HTTP/2.
    pub fn is_http2(&self) -> bool {
        matches!(self, Protocol::Http2 | Protocol::Grpc)
    }

    /// Whether this port is served by a TCP proxy chain.
    pub fn is_tcp(&self) -> bool {
        matches!(
            self,
            Protocol::Tcp | Protocol::Https | Protocol::Tls | Protocol::Mongo | Protocol::Redis
        )
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Http => "http",
            Protocol::Http2 => "http2",
            Protocol::Grpc => "grpc",
            Protocol::Https => "https",
            Protocol::Tcp => "tcp",
            Protocol::Tls => "tls",
            Protocol::Mongo => "mongo",
            Protocol::Redis => "redis",
            Protocol::Udp => "udp",
            Protocol::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// A named service port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Port name, unique within the service.
    pub name: String,
    /// Port number.
    pub port: u16,
    /// Application protocol.
    pub protocol: Protocol,
}

impl Port {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Port {
            name: name.into(),
            port,
            protocol,
        }
    }
}

/// How a service's members are resolved by the data plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The control plane pushes member endpoints; the proxy load-balances.
    ClientSideLb,
    /// The proxy resolves the hostname over DNS.
    DnsLb,
    /// Connections pass through to their original destination.
    Passthrough,
}

/// A service known to the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    /// Fully qualified hostname, e.g. `a.default.svc.cluster.local`.
    pub hostname: String,
    /// Cluster-internal virtual IP; empty when none is assigned.
    pub address: String,
    /// Exposed ports.
    pub ports: Vec<Port>,
    /// Member resolution mode.
    pub resolution: Resolution,
    /// Whether the service lives outside the mesh.
    pub mesh_external: bool,
}

impl Service {
    /// The address an outbound TCP listener should bind for this service on
    /// the given wildcard address: the VIP when one exists.
    pub fn address_or(&self, wildcard: &str) -> String {
        if self.address.is_empty() {
            wildcard.to_string()
        } else {
            self.address.clone()
        }
    }

    /// Look up a port by number.
    pub fn port_by_number(&self, number: u16) -> Option<&Port> {
        self.ports.iter().find(|p| p.port == number)
    }
}

/// Physical location of an endpoint, used to group endpoint assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locality {
    /// Region, e.g. `us-east1`.
    pub region: String,
    /// Zone within the region.
    pub zone: String,
    /// Sub-zone within the zone.
    pub sub_zone: String,
}

/// A network address a service instance listens on.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkEndpoint {
    /// Instance IP.
    pub address: String,
    /// Port the instance actually binds (may differ from the service port).
    pub port: u16,
    /// The service port this endpoint backs.
    pub service_port: Port,
    /// Physical location, when the registry knows it.
    pub locality: Option<Locality>,
}

/// Workload labels; a subset selector matches when every selector entry is
/// present with the same value.
pub type Labels = BTreeMap<String, String>;

/// Check whether `labels` satisfies `selector`.
pub fn labels_match(selector: &Labels, labels: &Labels) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).map(|lv| lv == v).unwrap_or(false))
}

/// One instance of a service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInstance {
    /// Where the instance listens.
    pub endpoint: NetworkEndpoint,
    /// Hostname of the owning service.
    pub service_hostname: String,
    /// Workload labels.
    pub labels: Labels,
}
