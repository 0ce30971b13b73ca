//! Discovery protocol envelope types.
//!
//! `DiscoveryRequest` and `DiscoveryResponse` are the two message shapes on
//! every stream, regardless of resource type. A request carrying the nonce of
//! a prior response is an ACK; an ACK with a populated `error_detail` is a
//! NACK.

use crate::core::Node;

/// `google.rpc.Status`, carried in `DiscoveryRequest.error_detail` on NACK.
pub mod rpc {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Status {
        #[prost(int32, tag = "1")]
        pub code: i32,
        #[prost(string, tag = "2")]
        pub message: String,
        #[prost(message, repeated, tag = "3")]
        pub details: Vec<prost_types::Any>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiscoveryRequest {
    /// Version of the config the client last applied; empty on first request.
    #[prost(string, tag = "1")]
    pub version_info: String,
    /// Node identity; must be populated on the first request of a stream.
    #[prost(message, optional, tag = "2")]
    pub node: Option<Node>,
    /// Requested resource names; empty means a wildcard subscription.
    #[prost(string, repeated, tag = "3")]
    pub resource_names: Vec<String>,
    #[prost(string, tag = "4")]
    pub type_url: String,
    /// Nonce of the response being ACKed/NACKed; empty on initial requests.
    #[prost(string, tag = "5")]
    pub response_nonce: String,
    /// Populated iff the client rejected the previous response.
    #[prost(message, optional, tag = "6")]
    pub error_detail: Option<rpc::Status>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DiscoveryResponse {
    /// Server-monotonic, opaque to the client.
    #[prost(string, tag = "1")]
    pub version_info: String,
    /// Full resource set for the type, each packed as `Any`.
    #[prost(message, repeated, tag = "2")]
    pub resources: Vec<prost_types::Any>,
    #[prost(bool, tag = "3")]
    pub canary: bool,
    #[prost(string, tag = "4")]
    pub type_url: String,
    /// Unique per response; echoed back by the client on ACK/NACK.
    #[prost(string, tag = "5")]
    pub nonce: String,
}

impl DiscoveryRequest {
    /// Whether this request rejects the previous response.
    pub fn is_nack(&self) -> bool {
        self.error_detail.is_some()
    }

    /// The node id, if the request carries one.
    pub fn node_id(&self) -> Option<&str> {
        self.node.as_ref().map(|n| n.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nack_detection() {
        let mut req = DiscoveryRequest::default();
        assert!(!req.is_nack());

        req.error_detail = Some(rpc::Status {
            code: 3,
            message: "bad config".to_string(),
            details: vec![],
        });
        assert!(req.is_nack());
    }

    #[test]
    fn node_id_access() {
        let req = DiscoveryRequest {
            node: Some(Node {
                id: "sidecar~10.0.0.5~app.default~default.svc.cluster.local".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            req.node_id(),
            Some("sidecar~10.0.0.5~app.default~default.svc.cluster.local")
        );
    }
}
