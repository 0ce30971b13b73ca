//! # helmsman-api
//!
//! Wire types for the discovery protocol spoken between helmsman and the
//! data-plane proxies.
//!
//! The message shapes are defined upstream by the proxy's API; this crate
//! carries hand-maintained prost mirrors of the subset helmsman actually
//! produces and consumes:
//!
//! - Discovery service envelope types (`DiscoveryRequest`, `DiscoveryResponse`)
//! - Resource types (`Cluster`, `ClusterLoadAssignment`, `Listener`,
//!   `RouteConfiguration`) and their supporting config messages
//! - The ADS and EDS gRPC service definitions (checked-in generated code)
//!
//! Field numbers match the upstream v3 schema so payloads are decodable by a
//! stock proxy. The core logic never reflects on these types at runtime; they
//! are plain records with a prost-derived serializer.

#![deny(unsafe_code)]
#![allow(missing_docs)] // mirrored wire types carry upstream semantics, not ours

pub mod cluster;
pub mod core;
pub mod discovery;
pub mod endpoint;
pub mod filter;
pub mod grpc;
pub mod listener;
pub mod route;
pub mod tls;

// Re-export prost types used in public signatures.
pub use prost::Message;
pub use prost_types::Any;

/// Pack a message into a `google.protobuf.Any` under the given type URL.
pub fn pack_any<M: prost::Message>(type_url: &str, message: &M) -> prost_types::Any {
    prost_types::Any {
        type_url: type_url.to_string(),
        value: message.encode_to_vec(),
    }
}

/// Convert a std duration into the wire duration type.
pub fn proto_duration(d: std::time::Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: d.as_secs() as i64,
        nanos: d.subsec_nanos() as i32,
    }
}
