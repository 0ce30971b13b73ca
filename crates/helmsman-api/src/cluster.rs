//! Cluster resource type (CDS payload).

use crate::core::{ConfigSource, Http2ProtocolOptions, TransportSocket};
use crate::endpoint::ClusterLoadAssignment;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cluster {
    #[prost(string, tag = "1")]
    pub name: String,
    /// How members of this cluster are discovered.
    #[prost(enumeration = "cluster::DiscoveryType", tag = "2")]
    pub r#type: i32,
    /// Set iff `type == EDS`; names the resource to subscribe to over ADS.
    #[prost(message, optional, tag = "3")]
    pub eds_cluster_config: Option<cluster::EdsClusterConfig>,
    /// Must be > 0; the proxy rejects clusters with a zero timeout.
    #[prost(message, optional, tag = "4")]
    pub connect_timeout: Option<prost_types::Duration>,
    #[prost(enumeration = "cluster::LbPolicy", tag = "6")]
    pub lb_policy: i32,
    /// Wrapped `google.protobuf.UInt32Value`.
    #[prost(message, optional, tag = "9")]
    pub max_requests_per_connection: Option<u32>,
    #[prost(message, optional, tag = "10")]
    pub circuit_breakers: Option<CircuitBreakers>,
    #[prost(message, optional, tag = "14")]
    pub http2_protocol_options: Option<Http2ProtocolOptions>,
    #[prost(enumeration = "cluster::DnsLookupFamily", tag = "17")]
    pub dns_lookup_family: i32,
    #[prost(message, optional, tag = "19")]
    pub outlier_detection: Option<OutlierDetection>,
    #[prost(message, optional, tag = "24")]
    pub transport_socket: Option<TransportSocket>,
    /// Inlined member addresses for STATIC and STRICT_DNS clusters.
    #[prost(message, optional, tag = "33")]
    pub load_assignment: Option<ClusterLoadAssignment>,
}

pub mod cluster {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum DiscoveryType {
        Static = 0,
        StrictDns = 1,
        LogicalDns = 2,
        Eds = 3,
        OriginalDst = 4,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum LbPolicy {
        RoundRobin = 0,
        LeastRequest = 1,
        RingHash = 2,
        Random = 3,
        Maglev = 5,
        /// Load balancing is delegated to the cluster implementation; used
        /// with ORIGINAL_DST passthrough clusters.
        ClusterProvided = 6,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum DnsLookupFamily {
        Auto = 0,
        V4Only = 1,
        V6Only = 2,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct EdsClusterConfig {
        #[prost(message, optional, tag = "1")]
        pub eds_config: Option<super::ConfigSource>,
        #[prost(string, tag = "2")]
        pub service_name: String,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CircuitBreakers {
    #[prost(message, repeated, tag = "1")]
    pub thresholds: Vec<circuit_breakers::Thresholds>,
}

pub mod circuit_breakers {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Thresholds {
        /// All wrapped `google.protobuf.UInt32Value`s.
        #[prost(message, optional, tag = "2")]
        pub max_connections: Option<u32>,
        #[prost(message, optional, tag = "3")]
        pub max_pending_requests: Option<u32>,
        #[prost(message, optional, tag = "4")]
        pub max_requests: Option<u32>,
        #[prost(message, optional, tag = "5")]
        pub max_retries: Option<u32>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutlierDetection {
    #[prost(message, optional, tag = "1")]
    pub consecutive_5xx: Option<u32>,
    #[prost(message, optional, tag = "2")]
    pub interval: Option<prost_types::Duration>,
    #[prost(message, optional, tag = "3")]
    pub base_ejection_time: Option<prost_types::Duration>,
    #[prost(message, optional, tag = "4")]
    pub max_ejection_percent: Option<u32>,
}

impl Cluster {
    pub const TYPE_URL: &'static str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

    /// Point an EDS cluster at the aggregated stream, using the cluster's own
    /// name as the assignment key.
    pub fn with_ads_eds_config(mut self) -> Self {
        self.eds_cluster_config = Some(cluster::EdsClusterConfig {
            service_name: self.name.clone(),
            eds_config: Some(ConfigSource {
                config_source_specifier: Some(
                    crate::core::config_source::ConfigSourceSpecifier::Ads(
                        crate::core::AggregatedConfigSource {},
                    ),
                ),
            }),
        });
        self
    }
}
