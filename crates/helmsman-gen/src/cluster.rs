//! Cluster generation (CDS).
//!
//! Outbound clusters are produced per service and port: one default cluster
//! plus one per subset of the matching destination rule. Sidecars also get
//! static inbound clusters for their local instances and management ports.
//! A blackhole cluster is always appended for unmatched traffic and bypasses
//! the plugin chain.

use helmsman_api::cluster::{cluster, Cluster, CircuitBreakers, OutlierDetection};
use helmsman_api::core::{Http2ProtocolOptions, TransportSocket};
use helmsman_api::endpoint::{ClusterLoadAssignment, LbEndpoint, LocalityLbEndpoints};
use helmsman_api::tls::{
    CertificateValidationContext, CommonTlsContext, TlsCertificate, UpstreamTlsContext,
    TLS_TRANSPORT_SOCKET,
};
use helmsman_api::{pack_any, proto_duration};
use helmsman_core::names::{self, TrafficDirection};
use helmsman_core::{ProxyNode, Result};
use helmsman_model::{
    AuthPolicy, ConnectionPoolSettings, DestinationRule, Environment, LoadBalancerMode, MeshConfig,
    OutlierDetectionSettings, Port, Resolution, Service, ServiceInstance, TlsMode, TlsSettings,
    TrafficPolicy,
};
use tracing::warn;

use crate::plugin::ClusterParams;
use crate::ConfigGenerator;

/// ALPN for HTTP/2-capable upstreams.
const ALPN_H2: &[&str] = &["h2"];
/// ALPN for in-mesh HTTP/2 upstreams; the leading mesh token marks in-mesh
/// traffic for routing decisions.
const ALPN_MESH_H2: &[&str] = &["helmsman", "h2"];
/// ALPN for in-mesh non-HTTP/2 upstreams.
const ALPN_MESH: &[&str] = &["helmsman"];

/// Proxy default of 100 concurrent streams is too low for the data path.
const H2_MAX_CONCURRENT_STREAMS: u32 = 1_073_741_824;

pub(crate) fn build_clusters(
    gen: &ConfigGenerator,
    env: &dyn Environment,
    node: &ProxyNode,
) -> Result<Vec<Cluster>> {
    let mesh = env.mesh();
    let services = env.services()?;

    let mut clusters = build_outbound_clusters(gen, env, &mesh, node, &services);

    if node.node_type == helmsman_core::NodeType::Sidecar {
        let instances = env.proxy_instances(node)?;
        let management_ports = env.management_ports(&node.ip);
        clusters.extend(build_inbound_clusters(
            gen,
            env,
            node,
            &instances,
            &management_ports,
        ));
    }

    // The proxy rejects clusters with a zero connect timeout.
    for cluster in &mut clusters {
        if cluster.connect_timeout.is_none() {
            cluster.connect_timeout = Some(proto_duration(mesh.connect_timeout));
        }
    }

    // Catch-all sink for unmatched traffic; plugins are not consulted.
    clusters.push(build_blackhole_cluster(&mesh));

    Ok(clusters)
}

fn build_outbound_clusters(
    gen: &ConfigGenerator,
    env: &dyn Environment,
    mesh: &MeshConfig,
    node: &ProxyNode,
    services: &[Service],
) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    for service in services {
        let rule = env.destination_rule(&service.hostname);
        for port in &service.ports {
            let hosts = build_cluster_hosts(env, service, port);
            let accounts = env.service_accounts(&service.hostname, &port.name);

            let name =
                names::subset_key(TrafficDirection::Outbound, port.port, "", &service.hostname);
            let mut default_cluster =
                build_default_cluster(mesh, name, convert_resolution(service.resolution), hosts.clone());
            set_eds_config(&mut default_cluster);
            set_upstream_protocol(&mut default_cluster, port);

            let mut subset_clusters = Vec::new();
            match &rule {
                Some(rule) => {
                    apply_traffic_policy(
                        &mut default_cluster,
                        rule.traffic_policy.as_ref(),
                        Some(port),
                        &accounts,
                    );

                    for subset in &rule.subsets {
                        let subset_name = names::subset_key(
                            TrafficDirection::Outbound,
                            port.port,
                            &subset.name,
                            &service.hostname,
                        );
                        let mut subset_cluster = build_default_cluster(
                            mesh,
                            subset_name,
                            convert_resolution(service.resolution),
                            hosts.clone(),
                        );
                        set_eds_config(&mut subset_cluster);
                        set_upstream_protocol(&mut subset_cluster, port);
                        // Subset policy merges over the parent policy.
                        apply_traffic_policy(
                            &mut subset_cluster,
                            rule.traffic_policy.as_ref(),
                            Some(port),
                            &accounts,
                        );
                        apply_traffic_policy(
                            &mut subset_cluster,
                            subset.traffic_policy.as_ref(),
                            Some(port),
                            &accounts,
                        );
                        run_outbound_plugins(gen, env, node, service, port, &mut subset_cluster);
                        subset_clusters.push(subset_cluster);
                    }
                }
                None => {
                    // Mesh-wide mutual TLS applies to in-mesh destinations
                    // that carry no explicit rule.
                    if mesh.auth_policy == AuthPolicy::MutualTls && !service.mesh_external {
                        apply_upstream_tls(
                            &mut default_cluster,
                            &TlsSettings::mesh_mutual(accounts.clone()),
                        );
                    }
                }
            }

            run_outbound_plugins(gen, env, node, service, port, &mut default_cluster);
            clusters.push(default_cluster);
            clusters.extend(subset_clusters);
        }
    }
    clusters
}

fn run_outbound_plugins(
    gen: &ConfigGenerator,
    env: &dyn Environment,
    node: &ProxyNode,
    service: &Service,
    port: &Port,
    cluster: &mut Cluster,
) {
    let params = ClusterParams {
        env,
        node,
        service_hostname: &service.hostname,
        port,
    };
    for plugin in gen.plugins() {
        plugin.on_outbound_cluster(&params, cluster);
    }
}

fn build_inbound_clusters(
    gen: &ConfigGenerator,
    env: &dyn Environment,
    node: &ProxyNode,
    instances: &[ServiceInstance],
    management_ports: &[Port],
) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    for instance in instances {
        let port = &instance.endpoint.service_port;
        let name = names::subset_key(
            TrafficDirection::Inbound,
            port.port,
            "",
            &instance.service_hostname,
        );
        let mut cluster = build_static_cluster(name, "127.0.0.1", instance.endpoint.port);
        set_upstream_protocol(&mut cluster, port);

        // Circuit breakers configured for the destination apply on the
        // receiving side as well, so the server carries matching capacity.
        if let Some(rule) = env.destination_rule(&instance.service_hostname) {
            if let Some(policy) = &rule.traffic_policy {
                // Only connection pool settings make sense on the inbound
                // path; TLS, outlier detection and LB modes do not apply.
                apply_connection_pool(&mut cluster, policy.connection_pool.as_ref());
            }
        }

        let params = ClusterParams {
            env,
            node,
            service_hostname: &instance.service_hostname,
            port,
        };
        for plugin in gen.plugins() {
            plugin.on_inbound_cluster(&params, &mut cluster);
        }
        clusters.push(cluster);
    }

    for port in management_ports {
        let name = names::subset_key(
            TrafficDirection::Inbound,
            port.port,
            "",
            names::MANAGEMENT_CLUSTER_HOSTNAME,
        );
        let mut cluster = build_static_cluster(name, "127.0.0.1", port.port);
        set_upstream_protocol(&mut cluster, port);
        clusters.push(cluster);
    }

    clusters
}

/// Inline member addresses, only materialized for DNS-resolved services.
/// Registry-provided instances win; an external hostname without instances
/// resolves through its own DNS name.
fn build_cluster_hosts(
    env: &dyn Environment,
    service: &Service,
    port: &Port,
) -> Option<ClusterLoadAssignment> {
    if service.resolution != Resolution::DnsLb {
        return None;
    }

    let lb_endpoints = match env.instances_by_port(&service.hostname, port.port, None) {
        Ok(instances) if !instances.is_empty() => instances
            .iter()
            .map(|i| LbEndpoint::socket(i.endpoint.address.clone(), u32::from(i.endpoint.port)))
            .collect(),
        Ok(_) => vec![LbEndpoint::socket(
            service.hostname.clone(),
            u32::from(port.port),
        )],
        Err(err) => {
            warn!(
                hostname = %service.hostname,
                port = port.port,
                error = %err,
                "failed to retrieve instances for DNS cluster"
            );
            vec![LbEndpoint::socket(
                service.hostname.clone(),
                u32::from(port.port),
            )]
        }
    };

    Some(ClusterLoadAssignment {
        cluster_name: String::new(),
        endpoints: vec![LocalityLbEndpoints {
            lb_endpoints,
            ..Default::default()
        }],
    })
}

fn convert_resolution(resolution: Resolution) -> cluster::DiscoveryType {
    match resolution {
        Resolution::ClientSideLb => cluster::DiscoveryType::Eds,
        Resolution::DnsLb => cluster::DiscoveryType::StrictDns,
        Resolution::Passthrough => cluster::DiscoveryType::OriginalDst,
    }
}

fn build_default_cluster(
    mesh: &MeshConfig,
    name: String,
    discovery_type: cluster::DiscoveryType,
    mut hosts: Option<ClusterLoadAssignment>,
) -> Cluster {
    if let Some(assignment) = &mut hosts {
        assignment.cluster_name = name.clone();
    }
    let mut out = Cluster {
        name,
        r#type: discovery_type as i32,
        load_assignment: hosts,
        ..Default::default()
    };
    if matches!(
        discovery_type,
        cluster::DiscoveryType::StrictDns | cluster::DiscoveryType::LogicalDns
    ) {
        out.dns_lookup_family = cluster::DnsLookupFamily::V4Only as i32;
    }

    let default_policy = default_traffic_policy(mesh, discovery_type);
    apply_traffic_policy(&mut out, Some(&default_policy), None, &[]);
    out
}

fn build_static_cluster(name: String, ip: &str, port: u16) -> Cluster {
    Cluster {
        name: name.clone(),
        r#type: cluster::DiscoveryType::Static as i32,
        load_assignment: Some(ClusterLoadAssignment {
            cluster_name: name,
            endpoints: vec![LocalityLbEndpoints {
                lb_endpoints: vec![LbEndpoint::socket(ip, u32::from(port))],
                ..Default::default()
            }],
        }),
        ..Default::default()
    }
}

fn build_blackhole_cluster(mesh: &MeshConfig) -> Cluster {
    Cluster {
        name: names::BLACKHOLE_CLUSTER.to_string(),
        r#type: cluster::DiscoveryType::Static as i32,
        connect_timeout: Some(proto_duration(mesh.connect_timeout)),
        lb_policy: cluster::LbPolicy::RoundRobin as i32,
        ..Default::default()
    }
}

fn default_traffic_policy(mesh: &MeshConfig, discovery_type: cluster::DiscoveryType) -> TrafficPolicy {
    let lb = if discovery_type == cluster::DiscoveryType::OriginalDst {
        LoadBalancerMode::Passthrough
    } else {
        LoadBalancerMode::RoundRobin
    };
    TrafficPolicy {
        load_balancer: Some(lb),
        connection_pool: Some(ConnectionPoolSettings {
            tcp: Some(helmsman_model::TcpPoolSettings {
                max_connections: 0,
                connect_timeout: Some(mesh.connect_timeout),
            }),
            http: None,
        }),
        ..Default::default()
    }
}

fn set_eds_config(cluster_out: &mut Cluster) {
    if cluster_out.r#type == cluster::DiscoveryType::Eds as i32 {
        *cluster_out = std::mem::take(cluster_out).with_ads_eds_config();
        // EDS members come over the stream, not inline.
        cluster_out.load_assignment = None;
    }
}

fn set_upstream_protocol(cluster_out: &mut Cluster, port: &Port) {
    if port.protocol.is_http2() {
        cluster_out.http2_protocol_options = Some(Http2ProtocolOptions {
            max_concurrent_streams: Some(H2_MAX_CONCURRENT_STREAMS),
        });
    }
}

/// Apply a traffic policy, honoring the first matching port-level override.
pub(crate) fn apply_traffic_policy(
    cluster_out: &mut Cluster,
    policy: Option<&TrafficPolicy>,
    port: Option<&Port>,
    service_accounts: &[String],
) {
    let Some(policy) = policy else { return };

    let mut connection_pool = policy.connection_pool.as_ref();
    let mut outlier = policy.outlier_detection.as_ref();
    let mut load_balancer = policy.load_balancer;
    let mut tls = policy.tls.as_ref();

    if let Some(port) = port {
        if let Some(override_) = policy
            .port_level_settings
            .iter()
            .find(|p| p.port.matches(port))
        {
            connection_pool = override_.connection_pool.as_ref();
            outlier = override_.outlier_detection.as_ref();
            load_balancer = override_.load_balancer;
            tls = override_.tls.as_ref();
        }
    }

    apply_connection_pool(cluster_out, connection_pool);
    apply_outlier_detection(cluster_out, outlier);
    apply_load_balancer(cluster_out, load_balancer);
    if let Some(tls) = tls {
        let resolved = resolve_mesh_mutual(tls, service_accounts);
        apply_upstream_tls(cluster_out, &resolved);
    }
}

/// Fill the mesh certificate paths and SANs for `MeshMutual` settings that
/// were written without them.
fn resolve_mesh_mutual(tls: &TlsSettings, service_accounts: &[String]) -> TlsSettings {
    if tls.mode == TlsMode::MeshMutual && tls.client_certificate.is_empty() {
        TlsSettings::mesh_mutual(service_accounts.to_vec())
    } else {
        tls.clone()
    }
}

fn apply_connection_pool(cluster_out: &mut Cluster, settings: Option<&ConnectionPoolSettings>) {
    let Some(settings) = settings else { return };

    let mut threshold = helmsman_api::cluster::circuit_breakers::Thresholds::default();

    if let Some(http) = &settings.http {
        if http.http2_max_requests > 0 {
            // Only applied by the proxy on HTTP/2 clusters.
            threshold.max_requests = Some(http.http2_max_requests);
        }
        if http.http1_max_pending_requests > 0 {
            threshold.max_pending_requests = Some(http.http1_max_pending_requests);
        }
        if http.max_requests_per_connection > 0 {
            cluster_out.max_requests_per_connection = Some(http.max_requests_per_connection);
        }
        if http.max_retries > 0 {
            threshold.max_retries = Some(http.max_retries);
        }
    }

    if let Some(tcp) = &settings.tcp {
        if let Some(timeout) = tcp.connect_timeout {
            cluster_out.connect_timeout = Some(proto_duration(timeout));
        }
        if tcp.max_connections > 0 {
            threshold.max_connections = Some(tcp.max_connections);
        }
    }

    cluster_out.circuit_breakers = Some(CircuitBreakers {
        thresholds: vec![threshold],
    });
}

fn apply_outlier_detection(cluster_out: &mut Cluster, outlier: Option<&OutlierDetectionSettings>) {
    let Some(outlier) = outlier else { return };

    let mut out = OutlierDetection::default();
    if outlier.consecutive_errors > 0 {
        out.consecutive_5xx = Some(outlier.consecutive_errors);
    }
    if let Some(interval) = outlier.interval {
        out.interval = Some(proto_duration(interval));
    }
    if let Some(base) = outlier.base_ejection_time {
        out.base_ejection_time = Some(proto_duration(base));
    }
    if outlier.max_ejection_percent > 0 {
        out.max_ejection_percent = Some(outlier.max_ejection_percent);
    }
    cluster_out.outlier_detection = Some(out);
}

fn apply_load_balancer(cluster_out: &mut Cluster, lb: Option<LoadBalancerMode>) {
    match lb {
        Some(LoadBalancerMode::LeastConn) => {
            cluster_out.lb_policy = cluster::LbPolicy::LeastRequest as i32;
        }
        Some(LoadBalancerMode::Random) => {
            cluster_out.lb_policy = cluster::LbPolicy::Random as i32;
        }
        Some(LoadBalancerMode::RoundRobin) => {
            cluster_out.lb_policy = cluster::LbPolicy::RoundRobin as i32;
        }
        Some(LoadBalancerMode::Passthrough) => {
            cluster_out.lb_policy = cluster::LbPolicy::ClusterProvided as i32;
            cluster_out.r#type = cluster::DiscoveryType::OriginalDst as i32;
        }
        None => {}
    }
}

pub(crate) fn apply_upstream_tls(cluster_out: &mut Cluster, tls: &TlsSettings) {
    let validation_context = build_validation_context(tls);

    let context = match tls.mode {
        TlsMode::Disable => {
            // Strip anything inherited from mesh-wide settings.
            cluster_out.transport_socket = None;
            return;
        }
        TlsMode::Simple => UpstreamTlsContext {
            common_tls_context: Some(CommonTlsContext {
                validation_context,
                alpn_protocols: if cluster_out.http2_protocol_options.is_some() {
                    to_strings(ALPN_H2)
                } else {
                    Vec::new()
                },
                ..Default::default()
            }),
            sni: tls.sni.clone(),
        },
        TlsMode::Mutual | TlsMode::MeshMutual => UpstreamTlsContext {
            common_tls_context: Some(CommonTlsContext {
                tls_certificates: vec![TlsCertificate {
                    certificate_chain: Some(helmsman_api::core::DataSource::filename(
                        tls.client_certificate.clone(),
                    )),
                    private_key: Some(helmsman_api::core::DataSource::filename(
                        tls.private_key.clone(),
                    )),
                }],
                validation_context,
                alpn_protocols: if cluster_out.http2_protocol_options.is_some() {
                    to_strings(ALPN_MESH_H2)
                } else {
                    to_strings(ALPN_MESH)
                },
            }),
            sni: tls.sni.clone(),
        },
    };

    cluster_out.transport_socket = Some(TransportSocket {
        name: TLS_TRANSPORT_SOCKET.to_string(),
        typed_config: Some(pack_any(UpstreamTlsContext::TYPE_URL, &context)),
    });
}

fn build_validation_context(tls: &TlsSettings) -> Option<CertificateValidationContext> {
    let trusted_ca = if tls.ca_certificates.is_empty() {
        None
    } else {
        Some(helmsman_api::core::DataSource::filename(
            tls.ca_certificates.clone(),
        ))
    };
    if trusted_ca.is_none() && tls.subject_alt_names.is_empty() {
        return None;
    }
    Some(CertificateValidationContext {
        trusted_ca,
        verify_subject_alt_name: tls.subject_alt_names.clone(),
    })
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
