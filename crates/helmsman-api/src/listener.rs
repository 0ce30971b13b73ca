//! Listener resource type (LDS payload).

use crate::core::{Address, TransportSocket};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Listener {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub address: Option<Address>,
    #[prost(message, repeated, tag = "3")]
    pub filter_chains: Vec<FilterChain>,
    /// Wrapped `google.protobuf.BoolValue`; set on the virtual intercept
    /// listener so connections are handed to the listener matching their
    /// original destination.
    #[prost(message, optional, tag = "4")]
    pub use_original_dst: Option<bool>,
    /// Wrapped `google.protobuf.BoolValue`; TPROXY interception.
    #[prost(message, optional, tag = "10")]
    pub transparent: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilterChain {
    #[prost(message, optional, tag = "1")]
    pub filter_chain_match: Option<FilterChainMatch>,
    #[prost(message, repeated, tag = "3")]
    pub filters: Vec<Filter>,
    #[prost(message, optional, tag = "6")]
    pub transport_socket: Option<TransportSocket>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilterChainMatch {
    /// SNI server names to match; used to disambiguate merged HTTPS chains.
    #[prost(string, repeated, tag = "11")]
    pub server_names: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Filter {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "4")]
    pub typed_config: Option<prost_types::Any>,
}

impl Listener {
    pub const TYPE_URL: &'static str = "type.googleapis.com/envoy.config.listener.v3.Listener";

    /// The `ip:port` this listener binds, for collision detection.
    pub fn authority(&self) -> String {
        self.address
            .as_ref()
            .map(Address::authority)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_authority() {
        let listener = Listener {
            name: "0.0.0.0_80".to_string(),
            address: Some(Address::socket("0.0.0.0", 80)),
            ..Default::default()
        };
        assert_eq!(listener.authority(), "0.0.0.0:80");
    }
}
