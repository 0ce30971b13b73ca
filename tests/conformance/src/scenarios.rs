//! Generator conformance against concrete mesh fixtures.

use helmsman_api::cluster::cluster::DiscoveryType;
use helmsman_core::names;
use helmsman_gen::ConfigGenerator;
use helmsman_model::{
    DestinationRule, Labels, LoadBalancerMode, Port, Protocol, Resolution, Service, Subset,
    TrafficPolicy,
};

use crate::fixtures::{base_registry, sidecar};

const OUTBOUND_CLUSTER: &str = "outbound|80||a.ns.svc.cluster.local";

/// A client-side-LB service yields an EDS cluster plus the blackhole, an
/// outbound HTTP listener and the virtual intercept listener, and an
/// endpoint assignment with exactly the live endpoints.
#[test]
fn client_side_lb_service_full_surface() {
    let registry = base_registry();
    let generator = ConfigGenerator::new();
    let node = sidecar();

    let clusters = generator.build_clusters(registry.as_ref(), &node).unwrap();
    let cluster_names: Vec<&str> = clusters.iter().map(|c| c.name.as_str()).collect();
    assert!(cluster_names.contains(&OUTBOUND_CLUSTER));
    assert!(cluster_names.contains(&names::BLACKHOLE_CLUSTER));

    let listeners = generator.build_listeners(registry.as_ref(), &node).unwrap();
    assert!(listeners.iter().any(|l| l.authority() == "0.0.0.0:80"));
    let virtual_listener = listeners
        .iter()
        .find(|l| l.name == names::VIRTUAL_LISTENER)
        .expect("virtual listener");
    assert_eq!(virtual_listener.use_original_dst, Some(true));

    let assignments =
        generator.build_endpoints(registry.as_ref(), &[OUTBOUND_CLUSTER.to_string()]);
    let assignment = &assignments[OUTBOUND_CLUSTER];
    assert_eq!(assignment.endpoint_count(), 2);

    let mut addresses: Vec<String> = assignment
        .endpoints
        .iter()
        .flat_map(|l| l.lb_endpoints.iter())
        .map(|e| {
            e.endpoint
                .as_ref()
                .unwrap()
                .address
                .as_ref()
                .unwrap()
                .authority()
        })
        .collect();
    addresses.sort();
    assert_eq!(addresses, vec!["1.1.1.1:9080", "1.1.1.2:9080"]);
}

/// A DNS-resolved external service becomes a strict-DNS cluster whose
/// members resolve through the hostname; no assignment subscription exists.
#[test]
fn dns_lb_external_service() {
    let registry = base_registry();
    registry.add_service(Service {
        hostname: "api.example.com".to_string(),
        address: String::new(),
        ports: vec![Port::new("http", 80, Protocol::Http)],
        resolution: Resolution::DnsLb,
        mesh_external: true,
    });

    let generator = ConfigGenerator::new();
    let clusters = generator.build_clusters(registry.as_ref(), &sidecar()).unwrap();
    let dns = clusters
        .iter()
        .find(|c| c.name == "outbound|80||api.example.com")
        .unwrap();

    assert_eq!(dns.r#type, DiscoveryType::StrictDns as i32);
    assert!(dns.eds_cluster_config.is_none(), "DNS clusters do not subscribe to EDS");
    let member = &dns.load_assignment.as_ref().unwrap().endpoints[0].lb_endpoints[0];
    assert_eq!(
        member.endpoint.as_ref().unwrap().address.as_ref().unwrap().authority(),
        "api.example.com:80"
    );
}

/// Two services sharing a wildcard port with HTTP and TCP protocols: the
/// first wins, the conflict gauge counts the loser.
#[test]
fn shared_port_protocol_conflict() {
    let registry = base_registry();
    registry.add_service(Service {
        hostname: "legacy.ns.svc.cluster.local".to_string(),
        address: String::new(),
        ports: vec![Port::new("tcp", 80, Protocol::Tcp)],
        resolution: Resolution::ClientSideLb,
        mesh_external: false,
    });

    let generator = ConfigGenerator::new();
    let listeners = generator.build_listeners(registry.as_ref(), &sidecar()).unwrap();

    let on_port: Vec<_> = listeners
        .iter()
        .filter(|l| l.authority() == "0.0.0.0:80")
        .collect();
    assert_eq!(on_port.len(), 1, "exactly one listener on the shared port");
    assert_eq!(generator.metrics().outbound_conflicts(), 1);
}

/// A destination rule with two subsets yields default + v1 + v2 clusters,
/// each subset merging its policy over the parent policy.
#[test]
fn destination_rule_subset_clusters() {
    let registry = base_registry();

    let mut v1 = Labels::new();
    v1.insert("version".to_string(), "v1".to_string());
    let mut v2 = Labels::new();
    v2.insert("version".to_string(), "v2".to_string());

    registry.set_destination_rule(DestinationRule {
        host: "a.ns.svc.cluster.local".to_string(),
        traffic_policy: Some(TrafficPolicy {
            load_balancer: Some(LoadBalancerMode::Random),
            ..Default::default()
        }),
        subsets: vec![
            Subset {
                name: "v1".to_string(),
                labels: v1,
                traffic_policy: Some(TrafficPolicy {
                    load_balancer: Some(LoadBalancerMode::LeastConn),
                    ..Default::default()
                }),
            },
            Subset {
                name: "v2".to_string(),
                labels: v2,
                traffic_policy: None,
            },
        ],
    });

    let generator = ConfigGenerator::new();
    let clusters = generator.build_clusters(registry.as_ref(), &sidecar()).unwrap();

    let for_service: Vec<_> = clusters
        .iter()
        .filter(|c| c.name.ends_with("a.ns.svc.cluster.local"))
        .collect();
    assert_eq!(for_service.len(), 3);

    let v1_cluster = clusters
        .iter()
        .find(|c| c.name == "outbound|80|v1|a.ns.svc.cluster.local")
        .unwrap();
    let v2_cluster = clusters
        .iter()
        .find(|c| c.name == "outbound|80|v2|a.ns.svc.cluster.local")
        .unwrap();

    use helmsman_api::cluster::cluster::LbPolicy;
    // v1 overrides the parent's Random with LeastConn; v2 inherits Random.
    assert_eq!(v1_cluster.lb_policy, LbPolicy::LeastRequest as i32);
    assert_eq!(v2_cluster.lb_policy, LbPolicy::Random as i32);
}

/// Cluster names stay within the length bound and distinct inputs never
/// collide after truncation.
#[test]
fn cluster_name_truncation_is_collision_resistant() {
    let long_host_a = format!("{}-a.ns.svc.cluster.local", "x".repeat(300));
    let long_host_b = format!("{}-b.ns.svc.cluster.local", "x".repeat(300));

    let a = names::subset_key(names::TrafficDirection::Outbound, 80, "", &long_host_a);
    let b = names::subset_key(names::TrafficDirection::Outbound, 80, "", &long_host_b);

    assert!(a.len() <= names::MAX_CLUSTER_NAME_LEN);
    assert!(b.len() <= names::MAX_CLUSTER_NAME_LEN);
    assert_ne!(a, b);
}
