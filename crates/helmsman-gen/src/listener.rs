//! Listener generation (LDS).
//!
//! Sidecars get inbound listeners (one per local endpoint, first binding
//! wins), outbound listeners (one per service port, wildcard for HTTP,
//! per-service address for TCP), management-port listeners, and a single
//! virtual listener on the intercept port with `use_original_dst`. Routers
//! and ingresses get a listener set per gateway definition instead.
//!
//! Filter chains are finalized after the plugin chain has run: HTTP chains
//! receive an HTTP connection manager, TCP chains their network filters. A
//! chain holding both kinds is invalid and the listener is dropped.

use std::collections::HashMap;

use helmsman_api::core::{config_source, AggregatedConfigSource, Address, ConfigSource};
use helmsman_api::filter::{
    http_connection_manager, well_known, AccessLog, FileAccessLog, HttpConnectionManager,
    HttpFilter, Rds, TcpProxy,
};
use helmsman_api::listener::{Filter, FilterChain, FilterChainMatch, Listener};
use helmsman_api::pack_any;
use helmsman_api::route::RouteConfiguration;
use helmsman_core::names::{self, TrafficDirection};
use helmsman_core::{NodeType, ProxyNode, Result};
use helmsman_model::{Environment, MeshConfig, Protocol, Resolution, Service, ServiceInstance};
use tracing::{debug, warn};

use crate::plugin::{ListenerParams, MutableListener};
use crate::route::build_inbound_route_config;
use crate::ConfigGenerator;

const WILDCARD_ADDRESS: &str = "0.0.0.0";
const LOCALHOST_ADDRESS: &str = "127.0.0.1";

/// Stat prefix for generated HTTP connection managers.
const HTTP_STAT_PREFIX: &str = "http";

/// Options for the HTTP connection manager of one filter chain.
#[derive(Default)]
struct HttpOpts {
    /// Inline route configuration (inbound listeners).
    route_config: Option<RouteConfiguration>,
    /// RDS route name (outbound listeners); wins over `route_config`.
    rds: Option<String>,
    use_remote_address: bool,
}

/// One filter chain to be built: SNI match plus either HTTP or TCP content.
#[derive(Default)]
struct FilterChainOpts {
    sni_hosts: Vec<String>,
    http: Option<HttpOpts>,
    network_filters: Vec<Filter>,
}

/// Everything needed to build one listener shell.
struct ListenerOpts {
    ip: String,
    port: u16,
    chains: Vec<FilterChainOpts>,
}

pub(crate) fn build_listeners(
    gen: &ConfigGenerator,
    env: &dyn Environment,
    node: &ProxyNode,
) -> Result<Vec<Listener>> {
    match node.node_type {
        NodeType::Sidecar => build_sidecar_listeners(gen, env, node),
        NodeType::Router | NodeType::Ingress => build_gateway_listeners(gen, env, node),
    }
}

fn build_sidecar_listeners(
    gen: &ConfigGenerator,
    env: &dyn Environment,
    node: &ProxyNode,
) -> Result<Vec<Listener>> {
    let mesh = env.mesh();
    let proxy_instances = env.proxy_instances(node)?;
    let services = env.services()?;

    let mut listeners = Vec::new();

    if mesh.proxy_listen_port > 0 {
        listeners.extend(build_sidecar_inbound_listeners(
            gen,
            env,
            &mesh,
            node,
            &proxy_instances,
        ));
        listeners.extend(build_sidecar_outbound_listeners(
            gen,
            env,
            &mesh,
            node,
            &proxy_instances,
            &services,
        ));

        // Management listeners must not shadow service listeners; when a
        // management port collides the probe traffic belongs to the service.
        for mgmt in build_management_listeners(&mesh, &env.management_ports(&node.ip), &node.ip) {
            if let Some(existing) = listeners.iter().find(|l| l.authority() == mgmt.authority()) {
                warn!(
                    address = %mgmt.authority(),
                    management = %mgmt.name,
                    listener = %existing.name,
                    "omitting management listener due to collision with service listener"
                );
                continue;
            }
            listeners.push(mgmt);
        }

        listeners.push(build_virtual_listener(&mesh, node));
    }

    if mesh.proxy_http_port > 0 {
        let opts = ListenerOpts {
            ip: LOCALHOST_ADDRESS.to_string(),
            port: mesh.proxy_http_port,
            chains: vec![FilterChainOpts {
                http: Some(HttpOpts {
                    rds: Some(names::RDS_HTTP_PROXY.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };
        let mut mutable = MutableListener::new(build_listener(&opts));
        match finalize_filters(&mesh, &mut mutable, &opts.chains) {
            Ok(()) => listeners.push(mutable.listener),
            Err(err) => warn!(error = %err, "failed to build HTTP proxy listener"),
        }
    }

    Ok(listeners)
}

fn build_sidecar_inbound_listeners(
    gen: &ConfigGenerator,
    env: &dyn Environment,
    mesh: &MeshConfig,
    node: &ProxyNode,
    proxy_instances: &[ServiceInstance],
) -> Vec<Listener> {
    let mut listeners = Vec::new();
    // Endpoint address to listener name; the first binding wins.
    let mut listener_map: HashMap<String, String> = HashMap::new();

    for instance in proxy_instances {
        let endpoint = &instance.endpoint;
        let protocol = endpoint.service_port.protocol;
        let key = format!("{}:{}", endpoint.address, endpoint.port);

        if let Some(existing) = listener_map.get(&key) {
            warn!(
                address = %key,
                listener = %existing,
                "conflicting inbound listeners, skipping duplicate binding"
            );
            continue;
        }

        let chain = if protocol.is_http() {
            FilterChainOpts {
                http: Some(HttpOpts {
                    route_config: Some(build_inbound_route_config(instance)),
                    ..Default::default()
                }),
                ..Default::default()
            }
        } else if protocol.is_tcp() {
            FilterChainOpts {
                network_filters: vec![build_inbound_tcp_filter(instance)],
                ..Default::default()
            }
        } else {
            warn!(
                protocol = %protocol,
                port = endpoint.port,
                "unsupported inbound protocol"
            );
            continue;
        };

        let opts = ListenerOpts {
            ip: endpoint.address.clone(),
            port: endpoint.port,
            chains: vec![chain],
        };
        let mut mutable = MutableListener::new(build_listener(&opts));

        let params = ListenerParams {
            env,
            node,
            proxy_instances,
            service: None,
            instance: Some(instance),
        };
        for plugin in gen.plugins() {
            if let Err(err) = plugin.on_inbound_listener(&params, &mut mutable) {
                warn!(error = %err, "inbound listener plugin failed");
            }
        }

        match finalize_filters(mesh, &mut mutable, &opts.chains) {
            Ok(()) => {
                listener_map.insert(key, mutable.listener.name.clone());
                listeners.push(mutable.listener);
            }
            Err(err) => warn!(error = %err, "dropping inbound listener"),
        }
    }

    listeners
}

fn build_sidecar_outbound_listeners(
    gen: &ConfigGenerator,
    env: &dyn Environment,
    mesh: &MeshConfig,
    node: &ProxyNode,
    proxy_instances: &[ServiceInstance],
    services: &[Service],
) -> Vec<Listener> {
    // Insertion-ordered so output is deterministic over the sorted services.
    let mut order: Vec<String> = Vec::new();
    let mut listener_map: HashMap<String, (Listener, Protocol)> = HashMap::new();

    for service in services {
        for port in &service.ports {
            let cluster_name = names::subset_key(
                TrafficDirection::Outbound,
                port.port,
                "",
                &service.hostname,
            );

            let (key, chain, merge) = if port.protocol.is_http() {
                let key = format!("{}:{}", WILDCARD_ADDRESS, port.port);
                if let Some((existing, existing_protocol)) = listener_map.get(&key) {
                    if !existing_protocol.is_http() {
                        gen.metrics().record_outbound_conflict();
                        warn!(
                            address = %key,
                            current = %existing_protocol,
                            new = %port.protocol,
                            destination = %cluster_name,
                            listener = %existing.name,
                            "outbound listener conflict"
                        );
                    }
                    // Same HTTP port already has a listener; RDS fans the
                    // virtual hosts out, nothing to add here.
                    continue;
                }
                let chain = FilterChainOpts {
                    http: Some(HttpOpts {
                        rds: Some(port.port.to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                (key, chain, false)
            } else if port.protocol.is_tcp() {
                let listen_address = if service.resolution != Resolution::Passthrough {
                    service.address_or(WILDCARD_ADDRESS)
                } else {
                    WILDCARD_ADDRESS.to_string()
                };
                let key = format!("{}:{}", listen_address, port.port);

                let mut merge = false;
                if let Some((existing, existing_protocol)) = listener_map.get(&key) {
                    // An HTTPS port of an external service can share the
                    // address with another TCP listener: SNI disambiguates
                    // the chains. Everything else is a conflict.
                    let sni_merge = existing_protocol.is_tcp()
                        && port.protocol == Protocol::Https
                        && service.mesh_external;
                    if !sni_merge {
                        gen.metrics().record_outbound_conflict();
                        warn!(
                            address = %key,
                            current = %existing_protocol,
                            new = %port.protocol,
                            destination = %cluster_name,
                            listener = %existing.name,
                            "outbound listener conflict"
                        );
                        continue;
                    }
                    merge = true;
                }

                let sni_hosts = if port.protocol == Protocol::Https && service.mesh_external {
                    vec![service.hostname.clone()]
                } else {
                    Vec::new()
                };
                let chain = FilterChainOpts {
                    sni_hosts,
                    network_filters: vec![Filter {
                        name: well_known::TCP_PROXY.to_string(),
                        typed_config: Some(pack_any(
                            TcpProxy::TYPE_URL,
                            &TcpProxy::to_cluster(cluster_name.clone(), cluster_name.clone()),
                        )),
                    }],
                    ..Default::default()
                };
                (key, chain, merge)
            } else {
                // UDP and friends; too noisy to log per port.
                continue;
            };

            let (ip, _) = key.rsplit_once(':').unwrap_or((WILDCARD_ADDRESS, ""));
            let opts = ListenerOpts {
                ip: ip.to_string(),
                port: port.port,
                chains: vec![chain],
            };
            let mut mutable = MutableListener::new(build_listener(&opts));

            let params = ListenerParams {
                env,
                node,
                proxy_instances,
                service: Some(service),
                instance: None,
            };
            for plugin in gen.plugins() {
                if let Err(err) = plugin.on_outbound_listener(&params, &mut mutable) {
                    warn!(error = %err, "outbound listener plugin failed");
                }
            }

            match finalize_filters(mesh, &mut mutable, &opts.chains) {
                Ok(()) => {
                    if merge {
                        if let Some((existing, _)) = listener_map.get_mut(&key) {
                            debug!(
                                listener = %existing.name,
                                chains = existing.filter_chains.len() + mutable.listener.filter_chains.len(),
                                "merging SNI filter chains into existing listener"
                            );
                            existing.filter_chains.extend(mutable.listener.filter_chains);
                        }
                    } else {
                        order.push(key.clone());
                        listener_map.insert(key, (mutable.listener, port.protocol));
                    }
                }
                Err(err) => warn!(error = %err, "dropping outbound listener"),
            }
        }
    }

    // Validate, then order TCP listeners ahead of HTTP listeners.
    let mut tcp_listeners = Vec::new();
    let mut http_listeners = Vec::new();
    for key in order {
        let Some((listener, protocol)) = listener_map.remove(&key) else {
            continue;
        };
        if listener.filter_chains.is_empty()
            || listener.filter_chains.iter().any(|c| c.filters.is_empty())
        {
            warn!(listener = %listener.name, "invalid outbound listener");
            gen.metrics().record_invalid_outbound();
            continue;
        }
        if protocol.is_tcp() {
            tcp_listeners.push(listener);
        } else {
            http_listeners.push(listener);
        }
    }
    tcp_listeners.extend(http_listeners);
    tcp_listeners
}

/// Inbound TCP-only listeners for management (health check) ports. These do
/// not run plugins; probe traffic gets no mesh policy.
fn build_management_listeners(
    mesh: &MeshConfig,
    management_ports: &[helmsman_model::Port],
    management_ip: &str,
) -> Vec<Listener> {
    let ip = if management_ip.is_empty() {
        LOCALHOST_ADDRESS
    } else {
        management_ip
    };

    let mut listeners = Vec::new();
    for port in management_ports {
        match port.protocol {
            Protocol::Http
            | Protocol::Http2
            | Protocol::Grpc
            | Protocol::Tcp
            | Protocol::Https
            | Protocol::Mongo
            | Protocol::Redis => {
                let cluster = names::subset_key(
                    TrafficDirection::Inbound,
                    port.port,
                    "",
                    names::MANAGEMENT_CLUSTER_HOSTNAME,
                );
                let opts = ListenerOpts {
                    ip: ip.to_string(),
                    port: port.port,
                    chains: vec![FilterChainOpts {
                        network_filters: vec![Filter {
                            name: well_known::TCP_PROXY.to_string(),
                            typed_config: Some(pack_any(
                                TcpProxy::TYPE_URL,
                                &TcpProxy::to_cluster(cluster.clone(), cluster),
                            )),
                        }],
                        ..Default::default()
                    }],
                };
                let mut mutable = MutableListener::new(build_listener(&opts));
                match finalize_filters(mesh, &mut mutable, &opts.chains) {
                    Ok(()) => listeners.push(mutable.listener),
                    Err(err) => warn!(error = %err, "dropping management listener"),
                }
            }
            _ => {
                warn!(
                    protocol = %port.protocol,
                    port = port.port,
                    "unsupported protocol for management port"
                );
            }
        }
    }
    listeners
}

/// The catch-all listener on the intercept port. Intercepted connections are
/// re-dispatched to the listener matching their original destination; what
/// nothing matches falls into the blackhole.
fn build_virtual_listener(mesh: &MeshConfig, node: &ProxyNode) -> Listener {
    let transparent = node
        .metadata
        .get("INTERCEPTION_MODE")
        .map(|mode| mode == "TPROXY")
        .unwrap_or(false);

    Listener {
        name: names::VIRTUAL_LISTENER.to_string(),
        address: Some(Address::socket(
            WILDCARD_ADDRESS,
            u32::from(mesh.proxy_listen_port),
        )),
        use_original_dst: Some(true),
        transparent: transparent.then_some(true),
        filter_chains: vec![FilterChain {
            filters: vec![Filter {
                name: well_known::TCP_PROXY.to_string(),
                typed_config: Some(pack_any(
                    TcpProxy::TYPE_URL,
                    &TcpProxy::to_cluster(names::BLACKHOLE_CLUSTER, names::BLACKHOLE_CLUSTER),
                )),
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn build_gateway_listeners(
    gen: &ConfigGenerator,
    env: &dyn Environment,
    node: &ProxyNode,
) -> Result<Vec<Listener>> {
    let mesh = env.mesh();
    let proxy_instances = env.proxy_instances(node)?;

    let mut listeners = Vec::new();
    let mut bound_ports: HashMap<u16, String> = HashMap::new();

    for gateway in env.gateways(node) {
        for server in &gateway.servers {
            if !server.port.protocol.is_http() {
                warn!(
                    gateway = %gateway.name,
                    protocol = %server.port.protocol,
                    "unsupported gateway server protocol"
                );
                continue;
            }
            if let Some(owner) = bound_ports.get(&server.port.port) {
                warn!(
                    gateway = %gateway.name,
                    port = server.port.port,
                    owner = %owner,
                    "gateway port already bound, skipping"
                );
                continue;
            }

            let opts = ListenerOpts {
                ip: WILDCARD_ADDRESS.to_string(),
                port: server.port.port,
                chains: vec![FilterChainOpts {
                    http: Some(HttpOpts {
                        rds: Some(server.port.port.to_string()),
                        use_remote_address: true,
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
            };
            let mut mutable = MutableListener::new(build_listener(&opts));
            mutable.listener.name = format!("{}_{}", gateway.name, server.port.port);

            let params = ListenerParams {
                env,
                node,
                proxy_instances: &proxy_instances,
                service: None,
                instance: None,
            };
            for plugin in gen.plugins() {
                if let Err(err) = plugin.on_outbound_listener(&params, &mut mutable) {
                    warn!(error = %err, "gateway listener plugin failed");
                }
            }

            match finalize_filters(&mesh, &mut mutable, &opts.chains) {
                Ok(()) => {
                    bound_ports.insert(server.port.port, gateway.name.clone());
                    listeners.push(mutable.listener);
                }
                Err(err) => warn!(error = %err, "dropping gateway listener"),
            }
        }
    }

    if mesh.proxy_http_port > 0 {
        let opts = ListenerOpts {
            ip: WILDCARD_ADDRESS.to_string(),
            port: mesh.proxy_http_port,
            chains: vec![FilterChainOpts {
                http: Some(HttpOpts {
                    rds: Some(names::RDS_HTTP_PROXY.to_string()),
                    use_remote_address: true,
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };
        let mut mutable = MutableListener::new(build_listener(&opts));
        match finalize_filters(&mesh, &mut mutable, &opts.chains) {
            Ok(()) => listeners.push(mutable.listener),
            Err(err) => warn!(error = %err, "failed to build HTTP proxy listener"),
        }
    }

    Ok(listeners)
}

fn build_inbound_tcp_filter(instance: &ServiceInstance) -> Filter {
    let cluster = names::subset_key(
        TrafficDirection::Inbound,
        instance.endpoint.service_port.port,
        "",
        &instance.service_hostname,
    );
    Filter {
        name: well_known::TCP_PROXY.to_string(),
        typed_config: Some(pack_any(
            TcpProxy::TYPE_URL,
            &TcpProxy::to_cluster(cluster.clone(), cluster),
        )),
    }
}

/// Build the listener shell: address, name, and one empty chain per chain
/// option with its SNI match. Filters are attached in [`finalize_filters`].
fn build_listener(opts: &ListenerOpts) -> Listener {
    let filter_chains = opts
        .chains
        .iter()
        .map(|chain| {
            // A wildcard SNI host means match-anything; emit no matcher.
            let matcher = if chain.sni_hosts.is_empty()
                || chain.sni_hosts.iter().any(|h| h == "*")
            {
                None
            } else {
                Some(FilterChainMatch {
                    server_names: chain.sni_hosts.clone(),
                })
            };
            FilterChain {
                filter_chain_match: matcher,
                ..Default::default()
            }
        })
        .collect();

    Listener {
        name: format!("{}_{}", opts.ip, opts.port),
        address: Some(Address::socket(opts.ip.clone(), u32::from(opts.port))),
        filter_chains,
        ..Default::default()
    }
}

/// Attach plugin filters and finalize every chain. A chain may hold network
/// filters or an HTTP connection manager, never both.
fn finalize_filters(
    mesh: &MeshConfig,
    mutable: &mut MutableListener,
    chain_opts: &[FilterChainOpts],
) -> Result<()> {
    let MutableListener { listener, chains } = mutable;
    if chain_opts.is_empty() {
        return Err(helmsman_core::Error::InvalidListener {
            name: listener.name.clone(),
            reason: "listener has no filter chains".to_string(),
        });
    }

    for (i, opt) in chain_opts.iter().enumerate() {
        let plugin_chain = &chains[i];
        let has_tcp = !plugin_chain.tcp.is_empty() || !opt.network_filters.is_empty();
        let has_http = !plugin_chain.http.is_empty() || opt.http.is_some();
        if has_tcp && has_http {
            return Err(helmsman_core::Error::InvalidListener {
                name: listener.name.clone(),
                reason: format!("chain {i} mixes network and HTTP filters"),
            });
        }

        let chain = &mut listener.filter_chains[i];
        chain.filters.extend(plugin_chain.tcp.iter().cloned());
        chain.filters.extend(opt.network_filters.iter().cloned());

        if let Some(http) = &opt.http {
            let manager = build_http_connection_manager(mesh, http, &plugin_chain.http);
            chain.filters.push(Filter {
                name: well_known::HTTP_CONNECTION_MANAGER.to_string(),
                typed_config: Some(pack_any(HttpConnectionManager::TYPE_URL, &manager)),
            });
        }
    }
    Ok(())
}

fn build_http_connection_manager(
    mesh: &MeshConfig,
    opts: &HttpOpts,
    plugin_filters: &[HttpFilter],
) -> HttpConnectionManager {
    let mut http_filters = plugin_filters.to_vec();
    http_filters.push(HttpFilter {
        name: well_known::CORS.to_string(),
        typed_config: None,
    });
    http_filters.push(HttpFilter {
        name: well_known::FAULT.to_string(),
        typed_config: None,
    });
    http_filters.push(HttpFilter {
        name: well_known::ROUTER.to_string(),
        typed_config: None,
    });

    let route_specifier = match (&opts.rds, &opts.route_config) {
        (Some(route_name), _) => {
            Some(http_connection_manager::RouteSpecifier::Rds(Rds {
                config_source: Some(ConfigSource {
                    config_source_specifier: Some(config_source::ConfigSourceSpecifier::Ads(
                        AggregatedConfigSource {},
                    )),
                }),
                route_config_name: route_name.clone(),
            }))
        }
        (None, Some(route_config)) => Some(
            http_connection_manager::RouteSpecifier::RouteConfig(route_config.clone()),
        ),
        (None, None) => None,
    };

    let access_log = match &mesh.access_log_file {
        Some(path) => vec![AccessLog {
            name: well_known::FILE_ACCESS_LOG.to_string(),
            typed_config: Some(pack_any(
                FileAccessLog::TYPE_URL,
                &FileAccessLog { path: path.clone() },
            )),
        }],
        None => Vec::new(),
    };

    HttpConnectionManager {
        codec_type: http_connection_manager::CodecType::Auto as i32,
        stat_prefix: HTTP_STAT_PREFIX.to_string(),
        http_filters,
        tracing: mesh
            .enable_tracing
            .then(http_connection_manager::Tracing::default),
        use_remote_address: Some(opts.use_remote_address),
        generate_request_id: mesh.enable_tracing.then_some(true),
        access_log,
        route_specifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Plugin;
    use helmsman_model::{
        Gateway, GatewayServer, Labels, MemoryRegistry, NetworkEndpoint, Port,
    };
    use prost::Message;

    fn sidecar() -> ProxyNode {
        ProxyNode::parse("sidecar~10.0.0.5~app.default~default.svc.cluster.local").unwrap()
    }

    fn service(hostname: &str, port: Port) -> Service {
        Service {
            hostname: hostname.to_string(),
            address: String::new(),
            ports: vec![port],
            resolution: Resolution::ClientSideLb,
            mesh_external: false,
        }
    }

    fn local_instance(hostname: &str, service_port: Port, bind_port: u16) -> ServiceInstance {
        ServiceInstance {
            endpoint: NetworkEndpoint {
                address: "10.0.0.5".to_string(),
                port: bind_port,
                service_port,
                locality: None,
            },
            service_hostname: hostname.to_string(),
            labels: Labels::new(),
        }
    }

    #[test]
    fn sidecar_gets_outbound_http_and_virtual_listener() {
        let registry = MemoryRegistry::new();
        registry.add_service(service(
            "a.default.svc.cluster.local",
            Port::new("http", 80, Protocol::Http),
        ));

        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &sidecar()).unwrap();

        let names: Vec<&str> = listeners.iter().map(|l| l.name.as_str()).collect();
        assert!(names.contains(&"0.0.0.0_80"), "{names:?}");
        assert!(names.contains(&names::VIRTUAL_LISTENER));

        let virtual_listener = listeners
            .iter()
            .find(|l| l.name == names::VIRTUAL_LISTENER)
            .unwrap();
        assert_eq!(virtual_listener.use_original_dst, Some(true));
        assert_eq!(virtual_listener.authority(), "0.0.0.0:15001");
    }

    #[test]
    fn outbound_http_listener_uses_rds() {
        let registry = MemoryRegistry::new();
        registry.add_service(service(
            "a.default.svc.cluster.local",
            Port::new("http", 80, Protocol::Http),
        ));

        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &sidecar()).unwrap();
        let http = listeners.iter().find(|l| l.name == "0.0.0.0_80").unwrap();

        let filter = &http.filter_chains[0].filters[0];
        assert_eq!(filter.name, well_known::HTTP_CONNECTION_MANAGER);
        let manager = HttpConnectionManager::decode(
            filter.typed_config.as_ref().unwrap().value.as_slice(),
        )
        .unwrap();
        match manager.route_specifier.unwrap() {
            http_connection_manager::RouteSpecifier::Rds(rds) => {
                assert_eq!(rds.route_config_name, "80");
            }
            other => panic!("expected RDS, got {other:?}"),
        }
    }

    #[test]
    fn tcp_http_port_collision_keeps_first_and_counts_conflict() {
        let registry = MemoryRegistry::new();
        // Sorted by hostname: the HTTP service comes first and wins.
        registry.add_service(service(
            "a.default.svc.cluster.local",
            Port::new("http", 80, Protocol::Http),
        ));
        registry.add_service(service(
            "b.default.svc.cluster.local",
            Port::new("tcp", 80, Protocol::Tcp),
        ));

        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &sidecar()).unwrap();

        let on_port_80: Vec<&Listener> = listeners
            .iter()
            .filter(|l| l.authority() == "0.0.0.0:80")
            .collect();
        assert_eq!(on_port_80.len(), 1);
        assert_eq!(gen.metrics().outbound_conflicts(), 1);
    }

    #[test]
    fn external_https_collision_merges_sni_chains() {
        let registry = MemoryRegistry::new();
        let mut first = service(
            "api.example.com",
            Port::new("https", 443, Protocol::Https),
        );
        first.mesh_external = true;
        let mut second = service(
            "www.example.com",
            Port::new("https", 443, Protocol::Https),
        );
        second.mesh_external = true;
        registry.add_service(first);
        registry.add_service(second);

        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &sidecar()).unwrap();

        let on_443: Vec<&Listener> = listeners
            .iter()
            .filter(|l| l.authority() == "0.0.0.0:443")
            .collect();
        assert_eq!(on_443.len(), 1);
        assert_eq!(on_443[0].filter_chains.len(), 2, "chains merged under SNI");
        assert_eq!(gen.metrics().outbound_conflicts(), 0);

        let sni: Vec<&Vec<String>> = on_443[0]
            .filter_chains
            .iter()
            .map(|c| &c.filter_chain_match.as_ref().unwrap().server_names)
            .collect();
        assert!(sni.contains(&&vec!["api.example.com".to_string()]));
        assert!(sni.contains(&&vec!["www.example.com".to_string()]));
    }

    #[test]
    fn inbound_listener_first_binding_wins() {
        let registry = MemoryRegistry::new();
        let http = Port::new("http", 80, Protocol::Http);
        registry.add_service(service("a.default.svc.cluster.local", http.clone()));
        registry.add_instance(local_instance("a.default.svc.cluster.local", http.clone(), 9080));
        registry.add_instance(local_instance("b.default.svc.cluster.local", http, 9080));

        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &sidecar()).unwrap();

        let inbound: Vec<&Listener> = listeners
            .iter()
            .filter(|l| l.authority() == "10.0.0.5:9080")
            .collect();
        assert_eq!(inbound.len(), 1);
    }

    #[test]
    fn management_listener_dropped_on_service_collision() {
        let registry = MemoryRegistry::new();
        let http = Port::new("http", 80, Protocol::Http);
        registry.add_service(service("a.default.svc.cluster.local", http.clone()));
        registry.add_instance(local_instance("a.default.svc.cluster.local", http, 9080));
        registry.set_management_ports(
            "10.0.0.5",
            vec![
                Port::new("probe", 9080, Protocol::Http),
                Port::new("health", 9901, Protocol::Http),
            ],
        );

        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &sidecar()).unwrap();

        // 9080 collides with the service instance listener and is dropped;
        // 9901 survives.
        let at_9080: Vec<&Listener> = listeners
            .iter()
            .filter(|l| l.authority() == "10.0.0.5:9080")
            .collect();
        assert_eq!(at_9080.len(), 1);
        assert!(listeners.iter().any(|l| l.authority() == "10.0.0.5:9901"));
    }

    #[test]
    fn tproxy_interception_sets_transparent() {
        let registry = MemoryRegistry::new();
        let mut node = sidecar();
        node.metadata
            .insert("INTERCEPTION_MODE".to_string(), "TPROXY".to_string());

        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &node).unwrap();
        let virtual_listener = listeners
            .iter()
            .find(|l| l.name == names::VIRTUAL_LISTENER)
            .unwrap();
        assert_eq!(virtual_listener.transparent, Some(true));
    }

    #[test]
    fn http_proxy_listener_enabled_by_mesh_config() {
        let mut mesh = MeshConfig::default();
        mesh.proxy_http_port = 15002;
        let registry = MemoryRegistry::with_mesh(mesh);

        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &sidecar()).unwrap();
        let proxy = listeners
            .iter()
            .find(|l| l.authority() == "127.0.0.1:15002")
            .expect("http proxy listener");

        let filter = &proxy.filter_chains[0].filters[0];
        let manager = HttpConnectionManager::decode(
            filter.typed_config.as_ref().unwrap().value.as_slice(),
        )
        .unwrap();
        match manager.route_specifier.unwrap() {
            http_connection_manager::RouteSpecifier::Rds(rds) => {
                assert_eq!(rds.route_config_name, names::RDS_HTTP_PROXY);
            }
            other => panic!("expected RDS, got {other:?}"),
        }
    }

    #[test]
    fn router_gets_gateway_listeners() {
        let registry = MemoryRegistry::new();
        registry.add_gateway(Gateway {
            name: "public".to_string(),
            servers: vec![GatewayServer {
                port: Port::new("http", 8080, Protocol::Http),
                hosts: vec!["*.example.com".to_string()],
            }],
        });

        let node =
            ProxyNode::parse("router~172.16.0.1~gw.system~system.svc.cluster.local").unwrap();
        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &node).unwrap();

        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].name, "public_8080");
        let filter = &listeners[0].filter_chains[0].filters[0];
        let manager = HttpConnectionManager::decode(
            filter.typed_config.as_ref().unwrap().value.as_slice(),
        )
        .unwrap();
        assert_eq!(manager.use_remote_address, Some(true));
    }

    #[test]
    fn plugin_mixing_http_filters_into_tcp_chain_drops_listener() {
        struct BadPlugin;
        impl Plugin for BadPlugin {
            fn on_outbound_listener(
                &self,
                _params: &ListenerParams<'_>,
                mutable: &mut MutableListener,
            ) -> Result<()> {
                mutable.chains[0].http.push(HttpFilter {
                    name: "bogus".to_string(),
                    typed_config: None,
                });
                Ok(())
            }
        }

        let registry = MemoryRegistry::new();
        registry.add_service(service(
            "tcp.default.svc.cluster.local",
            Port::new("tcp", 3306, Protocol::Tcp),
        ));

        let gen = ConfigGenerator::with_plugins(vec![Box::new(BadPlugin)]);
        let listeners = gen.build_listeners(&registry, &sidecar()).unwrap();
        assert!(!listeners.iter().any(|l| l.authority() == "0.0.0.0:3306"));
    }

    #[test]
    fn access_log_and_tracing_follow_mesh_config() {
        let mut mesh = MeshConfig::default();
        mesh.access_log_file = Some("/dev/stdout".to_string());
        mesh.enable_tracing = true;
        let registry = MemoryRegistry::with_mesh(mesh);
        registry.add_service(service(
            "a.default.svc.cluster.local",
            Port::new("http", 80, Protocol::Http),
        ));

        let gen = ConfigGenerator::new();
        let listeners = gen.build_listeners(&registry, &sidecar()).unwrap();
        let http = listeners.iter().find(|l| l.name == "0.0.0.0_80").unwrap();
        let manager = HttpConnectionManager::decode(
            http.filter_chains[0].filters[0]
                .typed_config
                .as_ref()
                .unwrap()
                .value
                .as_slice(),
        )
        .unwrap();

        assert_eq!(manager.access_log.len(), 1);
        assert!(manager.tracing.is_some());
        assert_eq!(manager.generate_request_id, Some(true));
    }
}
