//! Network and HTTP filter configurations referenced from listeners.
//!
//! Only the two filters helmsman emits are mirrored: the HTTP connection
//! manager for HTTP chains and the TCP proxy for TCP chains. Both are packed
//! into `Any` as a listener filter's `typed_config`.

use crate::core::ConfigSource;
use crate::route::RouteConfiguration;

/// Well-known filter names understood by the proxy.
pub mod well_known {
    pub const HTTP_CONNECTION_MANAGER: &str =
        "envoy.filters.network.http_connection_manager";
    pub const TCP_PROXY: &str = "envoy.filters.network.tcp_proxy";
    pub const ROUTER: &str = "envoy.filters.http.router";
    pub const CORS: &str = "envoy.filters.http.cors";
    pub const FAULT: &str = "envoy.filters.http.fault";
    pub const FILE_ACCESS_LOG: &str = "envoy.access_loggers.file";
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpConnectionManager {
    #[prost(enumeration = "http_connection_manager::CodecType", tag = "1")]
    pub codec_type: i32,
    #[prost(string, tag = "2")]
    pub stat_prefix: String,
    #[prost(message, repeated, tag = "5")]
    pub http_filters: Vec<HttpFilter>,
    #[prost(message, optional, tag = "7")]
    pub tracing: Option<http_connection_manager::Tracing>,
    /// Wrapped `google.protobuf.BoolValue`.
    #[prost(message, optional, tag = "14")]
    pub use_remote_address: Option<bool>,
    /// Wrapped `google.protobuf.BoolValue`.
    #[prost(message, optional, tag = "15")]
    pub generate_request_id: Option<bool>,
    #[prost(message, repeated, tag = "37")]
    pub access_log: Vec<AccessLog>,
    #[prost(oneof = "http_connection_manager::RouteSpecifier", tags = "3, 4")]
    pub route_specifier: Option<http_connection_manager::RouteSpecifier>,
}

pub mod http_connection_manager {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum CodecType {
        Auto = 0,
        Http1 = 1,
        Http2 = 2,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum RouteSpecifier {
        /// Fetch the route configuration over RDS.
        #[prost(message, tag = "3")]
        Rds(super::Rds),
        /// Inline route configuration.
        #[prost(message, tag = "4")]
        RouteConfig(super::RouteConfiguration),
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Tracing {}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Rds {
    #[prost(message, optional, tag = "1")]
    pub config_source: Option<ConfigSource>,
    #[prost(string, tag = "2")]
    pub route_config_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpFilter {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "4")]
    pub typed_config: Option<prost_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AccessLog {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "4")]
    pub typed_config: Option<prost_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileAccessLog {
    #[prost(string, tag = "1")]
    pub path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TcpProxy {
    #[prost(string, tag = "1")]
    pub stat_prefix: String,
    #[prost(oneof = "tcp_proxy::ClusterSpecifier", tags = "2")]
    pub cluster_specifier: Option<tcp_proxy::ClusterSpecifier>,
}

pub mod tcp_proxy {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum ClusterSpecifier {
        #[prost(string, tag = "2")]
        Cluster(String),
    }
}

impl HttpConnectionManager {
    pub const TYPE_URL: &'static str = "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
}

impl TcpProxy {
    pub const TYPE_URL: &'static str =
        "type.googleapis.com/envoy.extensions.filters.network.tcp_proxy.v3.TcpProxy";

    /// A TCP proxy forwarding everything to one cluster.
    pub fn to_cluster(stat_prefix: impl Into<String>, cluster: impl Into<String>) -> Self {
        TcpProxy {
            stat_prefix: stat_prefix.into(),
            cluster_specifier: Some(tcp_proxy::ClusterSpecifier::Cluster(cluster.into())),
        }
    }
}

impl FileAccessLog {
    pub const TYPE_URL: &'static str =
        "type.googleapis.com/envoy.extensions.access_loggers.file.v3.FileAccessLog";
}
