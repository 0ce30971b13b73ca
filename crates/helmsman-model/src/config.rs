//! Mesh-wide configuration, destination rules and route rules.

use std::time::Duration;

use crate::service::{Labels, Port};

/// Filename of the workload certificate chain under the certs mount.
pub const CERT_CHAIN_FILENAME: &str = "cert-chain.pem";
/// Filename of the workload private key under the certs mount.
pub const KEY_FILENAME: &str = "key.pem";
/// Filename of the mesh root certificate under the certs mount.
pub const ROOT_CERT_FILENAME: &str = "root-cert.pem";
/// Default mount point for workload certificates.
pub const AUTH_CERTS_PATH: &str = "/etc/certs";

/// Mesh-wide authentication policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPolicy {
    /// No transport authentication.
    #[default]
    None,
    /// Mutual TLS between all in-mesh workloads.
    MutualTls,
}

/// Mesh-wide settings supplied by the environment.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Transport authentication between workloads.
    pub auth_policy: AuthPolicy,
    /// Access log path for generated listeners; `None` disables access logs.
    pub access_log_file: Option<String>,
    /// Route refresh delay advertised in RDS config sources.
    pub rds_refresh_delay: Duration,
    /// Default cluster connect timeout; must be non-zero.
    pub connect_timeout: Duration,
    /// Whether generated HTTP connection managers emit tracing config.
    pub enable_tracing: bool,
    /// Port receiving iptables-intercepted traffic; the virtual listener
    /// binds here. Zero disables sidecar listener generation.
    pub proxy_listen_port: u16,
    /// Port for the explicit HTTP proxy listener; zero disables it.
    pub proxy_http_port: u16,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            auth_policy: AuthPolicy::None,
            access_log_file: None,
            rds_refresh_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            enable_tracing: false,
            proxy_listen_port: 15001,
            proxy_http_port: 0,
        }
    }
}

/// Upstream TLS mode for a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Strip any TLS settings inherited from mesh policy.
    Disable,
    /// Originate one-way TLS.
    Simple,
    /// Originate mutual TLS with explicit certificates.
    Mutual,
    /// Originate mutual TLS with the mesh-provisioned workload certificates.
    MeshMutual,
}

/// Upstream TLS settings for a destination or subset.
#[derive(Debug, Clone, PartialEq)]
pub struct TlsSettings {
    /// TLS mode.
    pub mode: TlsMode,
    /// Client certificate chain path (`Mutual` and `MeshMutual`).
    pub client_certificate: String,
    /// Private key path (`Mutual` and `MeshMutual`).
    pub private_key: String,
    /// CA bundle path used to verify the server.
    pub ca_certificates: String,
    /// Accepted subject alternative names.
    pub subject_alt_names: Vec<String>,
    /// SNI to present; empty keeps the transport default.
    pub sni: String,
}

impl TlsSettings {
    /// Mutual TLS using the mesh-provisioned certificates, verifying the
    /// given service accounts.
    pub fn mesh_mutual(subject_alt_names: Vec<String>) -> Self {
        TlsSettings {
            mode: TlsMode::MeshMutual,
            client_certificate: format!("{}/{}", AUTH_CERTS_PATH, CERT_CHAIN_FILENAME),
            private_key: format!("{}/{}", AUTH_CERTS_PATH, KEY_FILENAME),
            ca_certificates: format!("{}/{}", AUTH_CERTS_PATH, ROOT_CERT_FILENAME),
            subject_alt_names,
            sni: String::new(),
        }
    }
}

/// HTTP-level connection pool limits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpPoolSettings {
    /// Max pending HTTP/1.1 requests.
    pub http1_max_pending_requests: u32,
    /// Max concurrent HTTP/2 requests.
    pub http2_max_requests: u32,
    /// Max requests per upstream connection.
    pub max_requests_per_connection: u32,
    /// Max concurrent retries.
    pub max_retries: u32,
}

/// TCP-level connection pool limits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TcpPoolSettings {
    /// Max upstream connections.
    pub max_connections: u32,
    /// Per-connection connect timeout override.
    pub connect_timeout: Option<Duration>,
}

/// Connection pool settings for a destination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionPoolSettings {
    /// HTTP limits.
    pub http: Option<HttpPoolSettings>,
    /// TCP limits.
    pub tcp: Option<TcpPoolSettings>,
}

/// Outlier detection (passive health checking) settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlierDetectionSettings {
    /// Consecutive errors before ejection.
    pub consecutive_errors: u32,
    /// Analysis interval.
    pub interval: Option<Duration>,
    /// Minimum ejection duration.
    pub base_ejection_time: Option<Duration>,
    /// Ceiling on the ejected fraction of the cluster, in percent.
    pub max_ejection_percent: u32,
}

/// Load balancer algorithm for a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancerMode {
    /// Round robin (the default).
    RoundRobin,
    /// Least outstanding requests.
    LeastConn,
    /// Random member.
    Random,
    /// Pass through to the original destination.
    Passthrough,
}

/// Selects a service port within a traffic policy override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    /// Match by port name.
    Name(String),
    /// Match by port number.
    Number(u16),
}

impl PortSelector {
    /// Whether this selector matches the given port.
    pub fn matches(&self, port: &Port) -> bool {
        match self {
            PortSelector::Name(name) => *name == port.name,
            PortSelector::Number(number) => *number == port.port,
        }
    }
}

/// Traffic policy override scoped to one port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortTrafficPolicy {
    /// Which port the override applies to.
    pub port: PortSelector,
    /// Connection pool override.
    pub connection_pool: Option<ConnectionPoolSettings>,
    /// Outlier detection override.
    pub outlier_detection: Option<OutlierDetectionSettings>,
    /// Load balancer override.
    pub load_balancer: Option<LoadBalancerMode>,
    /// TLS override.
    pub tls: Option<TlsSettings>,
}

/// Traffic policy applied to a destination's clusters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficPolicy {
    /// Connection pool limits.
    pub connection_pool: Option<ConnectionPoolSettings>,
    /// Passive health checking.
    pub outlier_detection: Option<OutlierDetectionSettings>,
    /// Load balancer algorithm.
    pub load_balancer: Option<LoadBalancerMode>,
    /// Upstream TLS.
    pub tls: Option<TlsSettings>,
    /// Per-port overrides; the first matching entry wins.
    pub port_level_settings: Vec<PortTrafficPolicy>,
}

/// A labeled slice of a service's instances.
#[derive(Debug, Clone, PartialEq)]
pub struct Subset {
    /// Subset name, used in cluster names.
    pub name: String,
    /// Label selector picking the member instances.
    pub labels: Labels,
    /// Policy merged over the parent rule's policy.
    pub traffic_policy: Option<TrafficPolicy>,
}

/// Per-host traffic configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRule {
    /// Hostname the rule applies to.
    pub host: String,
    /// Policy for all of the host's clusters.
    pub traffic_policy: Option<TrafficPolicy>,
    /// Named subsets, each producing an extra cluster per port.
    pub subsets: Vec<Subset>,
}

/// One weighted destination of a route rule.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedDestination {
    /// Target hostname; `None` keeps the rule's hostname.
    pub hostname: Option<String>,
    /// Target subset; empty selects the default cluster.
    pub subset: String,
    /// Relative weight.
    pub weight: u32,
}

/// Retry budget for a route.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryBudget {
    /// Number of retry attempts.
    pub attempts: u32,
    /// Per-try timeout.
    pub per_try_timeout: Option<Duration>,
}

/// HTTP redirect action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Redirect {
    /// Replacement authority.
    pub authority: String,
    /// Replacement path.
    pub uri: String,
}

/// HTTP rewrite action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rewrite {
    /// Rewritten authority.
    pub authority: String,
    /// Rewritten path prefix.
    pub uri: String,
}

/// A routing rule for one hostname, feeding explicit routes ahead of the
/// default catch-all.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRule {
    /// Hostname the rule routes for.
    pub hostname: String,
    /// Restrict the rule to one service port; `None` applies to all.
    pub port: Option<u16>,
    /// Weighted destinations; a single entry collapses to a plain cluster.
    pub destinations: Vec<WeightedDestination>,
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Retry budget.
    pub retries: Option<RetryBudget>,
    /// Redirect instead of routing.
    pub redirect: Option<Redirect>,
    /// Authority/path rewrite.
    pub rewrite: Option<Rewrite>,
    /// Allow websocket upgrades on this route.
    pub websocket_upgrade: bool,
}

/// A gateway definition for router/ingress nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Gateway {
    /// Gateway name.
    pub name: String,
    /// Exposed servers, one listener each.
    pub servers: Vec<GatewayServer>,
}

/// One exposed port of a gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayServer {
    /// Bind port and protocol.
    pub port: Port,
    /// Hostnames served; used for SNI/virtual-host matching.
    pub hosts: Vec<String>,
}
