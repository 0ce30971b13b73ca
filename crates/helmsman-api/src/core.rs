//! Shared config primitives: node identity, addresses, config sources.
//!
//! Mirrors the `envoy.config.core.v3` subset referenced by the resource
//! types in this crate.

/// Identity of a proxy node, sent on the first request of every stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Node {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub cluster: String,
    /// Opaque key/value metadata; helmsman reads string values only.
    #[prost(message, optional, tag = "3")]
    pub metadata: Option<prost_types::Struct>,
    #[prost(message, optional, tag = "4")]
    pub locality: Option<Locality>,
    #[prost(string, tag = "6")]
    pub user_agent_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Locality {
    #[prost(string, tag = "1")]
    pub region: String,
    #[prost(string, tag = "2")]
    pub zone: String,
    #[prost(string, tag = "3")]
    pub sub_zone: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Address {
    #[prost(oneof = "address::Address", tags = "1, 2")]
    pub address: Option<address::Address>,
}

pub mod address {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Address {
        #[prost(message, tag = "1")]
        SocketAddress(super::SocketAddress),
        #[prost(message, tag = "2")]
        Pipe(super::Pipe),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pipe {
    #[prost(string, tag = "1")]
    pub path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SocketAddress {
    #[prost(enumeration = "socket_address::Protocol", tag = "1")]
    pub protocol: i32,
    #[prost(string, tag = "2")]
    pub address: String,
    #[prost(string, tag = "5")]
    pub resolver_name: String,
    #[prost(bool, tag = "6")]
    pub ipv4_compat: bool,
    #[prost(oneof = "socket_address::PortSpecifier", tags = "3, 4")]
    pub port_specifier: Option<socket_address::PortSpecifier>,
}

pub mod socket_address {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Protocol {
        Tcp = 0,
        Udp = 1,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PortSpecifier {
        #[prost(uint32, tag = "3")]
        PortValue(u32),
        #[prost(string, tag = "4")]
        NamedPort(String),
    }
}

/// Source for dynamically fetched configuration. Helmsman only ever emits
/// the ADS variant: all subscriptions ride the aggregated stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigSource {
    #[prost(oneof = "config_source::ConfigSourceSpecifier", tags = "3")]
    pub config_source_specifier: Option<config_source::ConfigSourceSpecifier>,
}

pub mod config_source {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum ConfigSourceSpecifier {
        #[prost(message, tag = "3")]
        Ads(super::AggregatedConfigSource),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AggregatedConfigSource {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransportSocket {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "3")]
    pub typed_config: Option<prost_types::Any>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Http2ProtocolOptions {
    /// Wrapped `google.protobuf.UInt32Value`.
    #[prost(message, optional, tag = "2")]
    pub max_concurrent_streams: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataSource {
    #[prost(oneof = "data_source::Specifier", tags = "1, 2, 3")]
    pub specifier: Option<data_source::Specifier>,
}

pub mod data_source {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Specifier {
        #[prost(string, tag = "1")]
        Filename(String),
        #[prost(bytes, tag = "2")]
        InlineBytes(Vec<u8>),
        #[prost(string, tag = "3")]
        InlineString(String),
    }
}

impl Address {
    /// Build a TCP socket address.
    pub fn socket(ip: impl Into<String>, port: u32) -> Self {
        Address {
            address: Some(address::Address::SocketAddress(SocketAddress {
                protocol: socket_address::Protocol::Tcp as i32,
                address: ip.into(),
                port_specifier: Some(socket_address::PortSpecifier::PortValue(port)),
                ..Default::default()
            })),
        }
    }

    /// Render as `ip:port` for use as a map key or log field.
    pub fn authority(&self) -> String {
        match &self.address {
            Some(address::Address::SocketAddress(sa)) => {
                let port = match sa.port_specifier {
                    Some(socket_address::PortSpecifier::PortValue(p)) => p,
                    _ => 0,
                };
                format!("{}:{}", sa.address, port)
            }
            Some(address::Address::Pipe(p)) => p.path.clone(),
            None => String::new(),
        }
    }
}

impl DataSource {
    /// A data source backed by a file on the proxy's filesystem.
    pub fn filename(path: impl Into<String>) -> Self {
        DataSource {
            specifier: Some(data_source::Specifier::Filename(path.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_authority() {
        let addr = Address::socket("10.0.0.5", 9080);
        assert_eq!(addr.authority(), "10.0.0.5:9080");
    }

    #[test]
    fn empty_address_authority() {
        let addr = Address::default();
        assert_eq!(addr.authority(), "");
    }
}
