//! Route configuration generation (RDS).
//!
//! The outbound HTTP route config for a port collects one virtual host per
//! service exposing that port. A virtual host's domains are every trimming of
//! the hostname against the proxy's domain suffix, each with and without the
//! port, plus the service VIP. Explicit routes from route rules come first,
//! in rule order, followed by a default catch-all to the service's default
//! cluster.

use helmsman_api::proto_duration;
use helmsman_api::route::{
    route, route_action, route_match, weighted_cluster, Decorator, RedirectAction,
    RetryPolicy, Route, RouteAction, RouteConfiguration, RouteMatch, VirtualHost, WeightedCluster,
};
use helmsman_core::names::{self, TrafficDirection};
use helmsman_core::{ProxyNode, Result};
use helmsman_model::{Environment, Port, RouteRule, Service, ServiceInstance};
use ::metrics::gauge;

/// Retry conditions considered safe to retry blindly.
const DEFAULT_RETRY_ON: &str = "5xx,connect-failure,refused-stream";

pub(crate) fn build_outbound_route_config(
    env: &dyn Environment,
    node: &ProxyNode,
    route_name: &str,
) -> Result<RouteConfiguration> {
    let services = env.services()?;
    gauge!("pilot_services").set(services.len() as f64);
    gauge!("pilot_virt_services").set(env.route_rule_count() as f64);

    let port_filter: Option<u16> = if route_name == names::RDS_HTTP_PROXY {
        None
    } else {
        // Route config names for sidecar outbound HTTP are port numbers.
        Some(route_name.parse().map_err(|_| {
            helmsman_core::Error::registry_msg(format!("unrecognized route config name {route_name:?}"))
        })?)
    };

    let suffix: Vec<&str> = node.domain.split('.').collect();
    let mut virtual_hosts = Vec::new();

    for service in &services {
        for port in &service.ports {
            if !port.protocol.is_http() {
                continue;
            }
            if let Some(wanted) = port_filter {
                if port.port != wanted {
                    continue;
                }
            }
            virtual_hosts.push(build_virtual_host(env, service, port, &suffix));
        }
    }

    Ok(RouteConfiguration {
        name: route_name.to_string(),
        virtual_hosts,
        validate_clusters: Some(false),
    })
}

/// The inline route config for an inbound HTTP listener: one wildcard
/// virtual host routing to the co-located instance's inbound cluster.
pub(crate) fn build_inbound_route_config(instance: &ServiceInstance) -> RouteConfiguration {
    let cluster = names::subset_key(
        TrafficDirection::Inbound,
        instance.endpoint.service_port.port,
        "",
        &instance.service_hostname,
    );
    RouteConfiguration {
        name: format!("inbound|{}", instance.endpoint.service_port.port),
        virtual_hosts: vec![VirtualHost {
            name: format!(
                "inbound|http|{}",
                instance.endpoint.service_port.port
            ),
            domains: vec!["*".to_string()],
            routes: vec![Route::default_to_cluster(cluster)],
        }],
        validate_clusters: Some(false),
    }
}

fn build_virtual_host(
    env: &dyn Environment,
    service: &Service,
    port: &Port,
    suffix: &[&str],
) -> VirtualHost {
    let mut routes = Vec::new();
    for rule in env.route_rules(&service.hostname) {
        if let Some(rule_port) = rule.port {
            if rule_port != port.port {
                continue;
            }
        }
        routes.push(build_route_for_rule(&rule, service, port));
    }
    routes.push(Route::default_to_cluster(names::subset_key(
        TrafficDirection::Outbound,
        port.port,
        "",
        &service.hostname,
    )));

    VirtualHost {
        name: format!("{}:{}", service.hostname, port.port),
        domains: build_domains(service, port, suffix),
        routes,
    }
}

/// Domains for a virtual host: every trimming of the hostname against the
/// shared suffix, with and without the port, plus the service VIP.
fn build_domains(service: &Service, port: &Port, suffix: &[&str]) -> Vec<String> {
    let parts: Vec<&str> = service.hostname.split('.').collect();
    let shared = shared_suffix(suffix, &parts);

    let mut hosts = Vec::new();
    let mut host = parts[..parts.len() - shared.len()].join(".");
    if !host.is_empty() {
        hosts.push(host.clone());
    }
    for part in &shared {
        if !host.is_empty() {
            host.push('.');
        }
        host.push_str(part);
        hosts.push(host.clone());
    }

    if !service.address.is_empty() {
        hosts.push(service.address.clone());
    }

    let mut domains = Vec::with_capacity(hosts.len() * 2);
    for host in &hosts {
        domains.push(format!("{}:{}", host, port.port));
        // The port on the listener address matches the service port, so the
        // colon suffix is optional and inferred.
        domains.push(host.clone());
    }
    domains
}

/// Longest common suffix of the two domain-part lists.
fn shared_suffix<'a>(suffix: &[&'a str], parts: &[&'a str]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let max = suffix.len().min(parts.len());
    for i in 1..=max {
        let a = suffix[suffix.len() - i];
        let b = parts[parts.len() - i];
        if a == b {
            out.push(a);
        } else {
            break;
        }
    }
    out.reverse();
    out
}

fn build_route_for_rule(rule: &RouteRule, service: &Service, port: &Port) -> Route {
    let mut action = RouteAction::default();

    // Weighted destinations, collapsed to a plain cluster when single.
    let mut weighted: Vec<weighted_cluster::ClusterWeight> = rule
        .destinations
        .iter()
        .map(|dst| {
            let hostname = dst.hostname.as_deref().unwrap_or(&service.hostname);
            weighted_cluster::ClusterWeight {
                name: names::subset_key(
                    TrafficDirection::Outbound,
                    port.port,
                    &dst.subset,
                    hostname,
                ),
                weight: Some(dst.weight),
            }
        })
        .collect();

    if weighted.len() == 1 {
        action.cluster_specifier = Some(route_action::ClusterSpecifier::Cluster(
            weighted.remove(0).name,
        ));
    } else if !weighted.is_empty() {
        action.cluster_specifier = Some(route_action::ClusterSpecifier::WeightedClusters(
            WeightedCluster { clusters: weighted },
        ));
    } else {
        action.cluster_specifier = Some(route_action::ClusterSpecifier::Cluster(
            names::subset_key(TrafficDirection::Outbound, port.port, "", &service.hostname),
        ));
    }

    if let Some(timeout) = rule.timeout {
        action.timeout = Some(proto_duration(timeout));
    }
    if let Some(retries) = &rule.retries {
        action.retry_policy = Some(RetryPolicy {
            retry_on: DEFAULT_RETRY_ON.to_string(),
            num_retries: Some(retries.attempts),
            per_try_timeout: retries.per_try_timeout.map(proto_duration),
        });
    }
    if let Some(rewrite) = &rule.rewrite {
        action.host_rewrite = rewrite.authority.clone();
        action.prefix_rewrite = rewrite.uri.clone();
    }
    if rule.websocket_upgrade {
        action.upgrade_configs = vec![route_action::UpgradeConfig {
            upgrade_type: "websocket".to_string(),
            enabled: Some(true),
        }];
    }

    let r#match = Some(RouteMatch {
        path_specifier: Some(route_match::PathSpecifier::Prefix("/".to_string())),
    });

    // A redirect replaces the routing action entirely.
    if let Some(redirect) = &rule.redirect {
        return Route {
            r#match,
            decorator: None,
            action: Some(route::Action::Redirect(RedirectAction {
                host_redirect: redirect.authority.clone(),
                path_redirect: redirect.uri.clone(),
            })),
        };
    }

    Route {
        r#match,
        decorator: Some(Decorator {
            operation: format!("{}:{}", rule.hostname, port.port),
        }),
        action: Some(route::Action::Route(action)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmsman_model::{
        Labels, MemoryRegistry, NetworkEndpoint, Protocol, Resolution, RetryBudget,
        WeightedDestination,
    };
    use std::time::Duration;

    fn sidecar() -> ProxyNode {
        ProxyNode::parse("sidecar~10.0.0.5~app.default~default.svc.cluster.local").unwrap()
    }

    fn registry() -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        registry.add_service(Service {
            hostname: "a.default.svc.cluster.local".to_string(),
            address: "10.96.0.10".to_string(),
            ports: vec![Port::new("http", 80, Protocol::Http)],
            resolution: Resolution::ClientSideLb,
            mesh_external: false,
        });
        registry
    }

    fn route_clusters(config: &RouteConfiguration) -> Vec<String> {
        config
            .virtual_hosts
            .iter()
            .flat_map(|vh| vh.routes.iter())
            .filter_map(|r| match &r.action {
                Some(route::Action::Route(a)) => match &a.cluster_specifier {
                    Some(route_action::ClusterSpecifier::Cluster(c)) => Some(c.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn port_route_config_has_default_route() {
        let registry = registry();
        let config = build_outbound_route_config(&registry, &sidecar(), "80").unwrap();

        assert_eq!(config.name, "80");
        assert_eq!(config.virtual_hosts.len(), 1);
        assert!(route_clusters(&config)
            .contains(&"outbound|80||a.default.svc.cluster.local".to_string()));
    }

    #[test]
    fn domains_are_trimmings_with_and_without_port() {
        let registry = registry();
        let config = build_outbound_route_config(&registry, &sidecar(), "80").unwrap();
        let domains = &config.virtual_hosts[0].domains;

        // Proxy domain is default.svc.cluster.local, so "a" through the full
        // hostname are all present, each with and without the port.
        for expected in [
            "a",
            "a:80",
            "a.default",
            "a.default:80",
            "a.default.svc",
            "a.default.svc.cluster",
            "a.default.svc.cluster.local",
            "a.default.svc.cluster.local:80",
            "10.96.0.10",
            "10.96.0.10:80",
        ] {
            assert!(domains.contains(&expected.to_string()), "missing {expected}: {domains:?}");
        }
    }

    #[test]
    fn unrelated_port_is_excluded() {
        let registry = registry();
        registry.add_service(Service {
            hostname: "b.default.svc.cluster.local".to_string(),
            address: String::new(),
            ports: vec![Port::new("http", 8080, Protocol::Http)],
            resolution: Resolution::ClientSideLb,
            mesh_external: false,
        });

        let config = build_outbound_route_config(&registry, &sidecar(), "80").unwrap();
        assert_eq!(config.virtual_hosts.len(), 1);
        assert!(config.virtual_hosts[0].name.starts_with("a.default"));
    }

    #[test]
    fn http_proxy_config_aggregates_all_http_ports() {
        let registry = registry();
        registry.add_service(Service {
            hostname: "b.default.svc.cluster.local".to_string(),
            address: String::new(),
            ports: vec![Port::new("http", 8080, Protocol::Http)],
            resolution: Resolution::ClientSideLb,
            mesh_external: false,
        });

        let config =
            build_outbound_route_config(&registry, &sidecar(), names::RDS_HTTP_PROXY).unwrap();
        assert_eq!(config.virtual_hosts.len(), 2);
    }

    #[test]
    fn weighted_routes_precede_default_and_collapse_when_single() {
        let registry = registry();
        registry.add_route_rule(RouteRule {
            hostname: "a.default.svc.cluster.local".to_string(),
            port: None,
            destinations: vec![
                WeightedDestination {
                    hostname: None,
                    subset: "v1".to_string(),
                    weight: 75,
                },
                WeightedDestination {
                    hostname: None,
                    subset: "v2".to_string(),
                    weight: 25,
                },
            ],
            timeout: None,
            retries: None,
            redirect: None,
            rewrite: None,
            websocket_upgrade: false,
        });
        registry.add_route_rule(RouteRule {
            hostname: "a.default.svc.cluster.local".to_string(),
            port: None,
            destinations: vec![WeightedDestination {
                hostname: None,
                subset: "canary".to_string(),
                weight: 100,
            }],
            timeout: Some(Duration::from_secs(3)),
            retries: Some(RetryBudget {
                attempts: 2,
                per_try_timeout: Some(Duration::from_millis(500)),
            }),
            redirect: None,
            rewrite: None,
            websocket_upgrade: true,
        });

        let config = build_outbound_route_config(&registry, &sidecar(), "80").unwrap();
        let routes = &config.virtual_hosts[0].routes;
        assert_eq!(routes.len(), 3, "two explicit routes then the catch-all");

        // First rule: two destinations stay weighted.
        match routes[0].action.as_ref().unwrap() {
            route::Action::Route(action) => match action.cluster_specifier.as_ref().unwrap() {
                route_action::ClusterSpecifier::WeightedClusters(wc) => {
                    assert_eq!(wc.clusters.len(), 2);
                    assert_eq!(wc.clusters[0].name, "outbound|80|v1|a.default.svc.cluster.local");
                    assert_eq!(wc.clusters[0].weight, Some(75));
                }
                other => panic!("expected weighted clusters, got {other:?}"),
            },
            other => panic!("expected route action, got {other:?}"),
        }

        // Second rule: single destination collapses to a plain cluster, with
        // timeout, retries and the websocket upgrade.
        match routes[1].action.as_ref().unwrap() {
            route::Action::Route(action) => {
                match action.cluster_specifier.as_ref().unwrap() {
                    route_action::ClusterSpecifier::Cluster(name) => {
                        assert_eq!(name, "outbound|80|canary|a.default.svc.cluster.local");
                    }
                    other => panic!("expected plain cluster, got {other:?}"),
                }
                assert!(action.timeout.is_some());
                assert_eq!(action.retry_policy.as_ref().unwrap().num_retries, Some(2));
                assert_eq!(action.upgrade_configs[0].upgrade_type, "websocket");
            }
            other => panic!("expected route action, got {other:?}"),
        }

        // Catch-all last.
        match routes[2].action.as_ref().unwrap() {
            route::Action::Route(action) => match action.cluster_specifier.as_ref().unwrap() {
                route_action::ClusterSpecifier::Cluster(name) => {
                    assert_eq!(name, "outbound|80||a.default.svc.cluster.local");
                }
                other => panic!("expected plain cluster, got {other:?}"),
            },
            other => panic!("expected route action, got {other:?}"),
        }
    }

    #[test]
    fn redirect_rule_produces_redirect_action() {
        let registry = registry();
        registry.add_route_rule(RouteRule {
            hostname: "a.default.svc.cluster.local".to_string(),
            port: None,
            destinations: vec![],
            timeout: None,
            retries: None,
            redirect: Some(helmsman_model::Redirect {
                authority: "b.default.svc.cluster.local".to_string(),
                uri: "/moved".to_string(),
            }),
            rewrite: None,
            websocket_upgrade: false,
        });

        let config = build_outbound_route_config(&registry, &sidecar(), "80").unwrap();
        match config.virtual_hosts[0].routes[0].action.as_ref().unwrap() {
            route::Action::Redirect(redirect) => {
                assert_eq!(redirect.host_redirect, "b.default.svc.cluster.local");
                assert_eq!(redirect.path_redirect, "/moved");
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn inbound_route_config_targets_inbound_cluster() {
        let instance = ServiceInstance {
            endpoint: NetworkEndpoint {
                address: "10.0.0.5".to_string(),
                port: 9080,
                service_port: Port::new("http", 80, Protocol::Http),
                locality: None,
            },
            service_hostname: "a.default.svc.cluster.local".to_string(),
            labels: Labels::new(),
        };
        let config = build_inbound_route_config(&instance);
        assert_eq!(config.virtual_hosts[0].domains, vec!["*".to_string()]);
        match config.virtual_hosts[0].routes[0].action.as_ref().unwrap() {
            route::Action::Route(action) => match action.cluster_specifier.as_ref().unwrap() {
                route_action::ClusterSpecifier::Cluster(name) => {
                    assert_eq!(name, "inbound|80||a.default.svc.cluster.local");
                }
                other => panic!("expected plain cluster, got {other:?}"),
            },
            other => panic!("expected route action, got {other:?}"),
        }
    }

    #[test]
    fn bogus_route_name_is_an_error() {
        let registry = registry();
        assert!(build_outbound_route_config(&registry, &sidecar(), "not-a-port").is_err());
    }
}
