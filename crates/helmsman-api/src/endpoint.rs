//! Endpoint assignment resource type (EDS payload).

use crate::core::{Address, Locality};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClusterLoadAssignment {
    /// Name of the cluster this assignment belongs to.
    #[prost(string, tag = "1")]
    pub cluster_name: String,
    /// Member endpoints, grouped by locality.
    #[prost(message, repeated, tag = "2")]
    pub endpoints: Vec<LocalityLbEndpoints>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LocalityLbEndpoints {
    #[prost(message, optional, tag = "1")]
    pub locality: Option<Locality>,
    #[prost(message, repeated, tag = "2")]
    pub lb_endpoints: Vec<LbEndpoint>,
    /// Wrapped `google.protobuf.UInt32Value`.
    #[prost(message, optional, tag = "3")]
    pub load_balancing_weight: Option<u32>,
    #[prost(uint32, tag = "5")]
    pub priority: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LbEndpoint {
    #[prost(message, optional, tag = "1")]
    pub endpoint: Option<Endpoint>,
    #[prost(message, optional, tag = "4")]
    pub load_balancing_weight: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Endpoint {
    #[prost(message, optional, tag = "1")]
    pub address: Option<Address>,
}

impl ClusterLoadAssignment {
    pub const TYPE_URL: &'static str =
        "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

    /// Total endpoint count across all localities.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.iter().map(|l| l.lb_endpoints.len()).sum()
    }
}

impl LbEndpoint {
    /// An endpoint at a plain TCP socket address.
    pub fn socket(ip: impl Into<String>, port: u32) -> Self {
        LbEndpoint {
            endpoint: Some(Endpoint {
                address: Some(Address::socket(ip, port)),
            }),
            load_balancing_weight: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_count_spans_localities() {
        let cla = ClusterLoadAssignment {
            cluster_name: "outbound|80||a.default.svc.cluster.local".to_string(),
            endpoints: vec![
                LocalityLbEndpoints {
                    lb_endpoints: vec![LbEndpoint::socket("1.1.1.1", 9080)],
                    ..Default::default()
                },
                LocalityLbEndpoints {
                    lb_endpoints: vec![
                        LbEndpoint::socket("1.1.1.2", 9080),
                        LbEndpoint::socket("1.1.1.3", 9080),
                    ],
                    ..Default::default()
                },
            ],
        };
        assert_eq!(cla.endpoint_count(), 3);
    }
}
