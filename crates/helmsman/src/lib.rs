//! # helmsman
//!
//! A service-mesh control plane core: helmsman streams proxy configuration
//! (clusters, listeners, routes, endpoint assignments) to a fleet of
//! data-plane proxies over the xDS discovery protocol, aggregated onto a
//! single bidirectional stream per proxy.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use helmsman::prelude::*;
//!
//! // Wire up a registry (any Environment implementation works).
//! let registry = Arc::new(MemoryRegistry::new());
//!
//! // Build the server and serve ADS + EDS + health.
//! let server = Arc::new(DiscoveryServer::new(registry.clone(), ConfigGenerator::new()));
//!
//! // From your change notifier:
//! // server.broadcast().await;
//!
//! server.serve("[::]:15010".parse()?).await?;
//! ```
//!
//! ## Architecture
//!
//! The workspace is organized one concern per crate:
//!
//! - `helmsman-api` - wire types and gRPC service definitions
//! - `helmsman-core` - node identity, naming, versions, errors
//! - `helmsman-model` - the abstract service model and registry facade
//! - `helmsman-gen` - config generators and the plugin chain
//! - `helmsman-discovery` - the discovery server itself
//!
//! This crate re-exports the public API for convenience.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use helmsman_api as api;
pub use helmsman_core as core;
pub use helmsman_discovery as discovery;
pub use helmsman_gen as gen;
pub use helmsman_model as model;

/// Convenient imports for embedders.
pub mod prelude {
    pub use helmsman_core::{Error, NodeType, ProxyNode, Result, TypeUrl};
    pub use helmsman_discovery::{DiscoveryConfig, DiscoveryServer, DiscoveryService};
    pub use helmsman_gen::{ConfigGenerator, Plugin};
    pub use helmsman_model::{
        DestinationRule, Environment, MemoryRegistry, MeshConfig, Port, Protocol, Resolution,
        RouteRule, Service, ServiceInstance,
    };
}
