//! Endpoint assignment generation (EDS).
//!
//! Assignments are recomputed from the registry on demand, keyed by cluster
//! name. Subset clusters resolve their label selector through the matching
//! destination rule. Zero-instance assignments are still produced so the
//! proxy drains removed members; the instance gauge makes them visible.

use std::collections::{BTreeMap, HashMap};

use helmsman_api::endpoint::{ClusterLoadAssignment, LbEndpoint, LocalityLbEndpoints};
use helmsman_core::names;
use helmsman_core::Result;
use helmsman_model::{Environment, Labels, Locality, ServiceInstance};
use ::metrics::gauge;
use tracing::{debug, warn};

pub(crate) fn build_endpoint(
    env: &dyn Environment,
    cluster_name: &str,
) -> Result<ClusterLoadAssignment> {
    let Some(key) = names::parse_subset_key(cluster_name) else {
        // Not one of ours (foreign cluster, truncated name); produce an
        // empty assignment rather than dangle.
        warn!(cluster = %cluster_name, "EDS request for unparseable cluster name");
        return Ok(ClusterLoadAssignment {
            cluster_name: cluster_name.to_string(),
            endpoints: vec![],
        });
    };

    let labels = subset_labels(env, &key);
    let instances = env.instances_by_port(&key.hostname, key.port, labels.as_ref())?;

    let instance_count = instances.len();
    gauge!("pilot_xds_eds_instances", "cluster" => cluster_name.to_string())
        .set(instance_count as f64);
    if instance_count == 0 {
        debug!(cluster = %cluster_name, "endpoint assignment has zero instances");
    }

    Ok(ClusterLoadAssignment {
        cluster_name: cluster_name.to_string(),
        endpoints: group_by_locality(&instances),
    })
}

pub(crate) fn build_endpoints(
    env: &dyn Environment,
    clusters: &[String],
) -> HashMap<String, ClusterLoadAssignment> {
    let mut out = HashMap::with_capacity(clusters.len());
    for cluster in clusters {
        match build_endpoint(env, cluster) {
            Ok(assignment) => {
                out.insert(cluster.clone(), assignment);
            }
            Err(err) => {
                warn!(cluster = %cluster, error = %err, "failed to build endpoint assignment");
            }
        }
    }
    out
}

fn subset_labels(env: &dyn Environment, key: &names::SubsetKey) -> Option<Labels> {
    if key.subset.is_empty() {
        return None;
    }
    let rule = env.destination_rule(&key.hostname)?;
    match rule.subsets.iter().find(|s| s.name == key.subset) {
        Some(subset) => Some(subset.labels.clone()),
        None => {
            warn!(
                cluster_subset = %key.subset,
                hostname = %key.hostname,
                "subset not found in destination rule"
            );
            None
        }
    }
}

fn group_by_locality(instances: &[ServiceInstance]) -> Vec<LocalityLbEndpoints> {
    let mut groups: BTreeMap<Locality, Vec<LbEndpoint>> = BTreeMap::new();
    for instance in instances {
        let locality = instance.endpoint.locality.clone().unwrap_or_default();
        groups.entry(locality).or_default().push(LbEndpoint::socket(
            instance.endpoint.address.clone(),
            u32::from(instance.endpoint.port),
        ));
    }

    groups
        .into_iter()
        .map(|(locality, lb_endpoints)| LocalityLbEndpoints {
            locality: if locality == Locality::default() {
                None
            } else {
                Some(helmsman_api::core::Locality {
                    region: locality.region,
                    zone: locality.zone,
                    sub_zone: locality.sub_zone,
                })
            },
            lb_endpoints,
            ..Default::default()
        })
        .collect()
}
