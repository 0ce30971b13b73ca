//! # helmsman-model
//!
//! The abstract service model the config generators translate from:
//!
//! - [`Service`], [`ServiceInstance`], [`Port`], [`Protocol`] - the shape of
//!   the registry contents
//! - [`DestinationRule`], [`TrafficPolicy`], [`Subset`] - per-host traffic
//!   configuration
//! - [`RouteRule`] - routing rules feeding weighted routes
//! - [`MeshConfig`] - mesh-wide settings
//! - [`Environment`] - the read-only facade over the service registry adapter
//! - [`MemoryRegistry`] - an in-memory implementation for tests and embedding
//!
//! The registry adapter behind [`Environment`] is an external collaborator;
//! the control plane treats it as an oracle and never writes through it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod environment;
mod memory;
mod service;

pub use config::{
    AuthPolicy, ConnectionPoolSettings, DestinationRule, Gateway, GatewayServer, HttpPoolSettings,
    LoadBalancerMode, MeshConfig, OutlierDetectionSettings, PortSelector, PortTrafficPolicy,
    Redirect, RetryBudget, Rewrite, RouteRule, Subset, TcpPoolSettings, TlsMode, TlsSettings,
    TrafficPolicy, WeightedDestination, AUTH_CERTS_PATH, CERT_CHAIN_FILENAME, KEY_FILENAME,
    ROOT_CERT_FILENAME,
};
pub use environment::Environment;
pub use memory::MemoryRegistry;
pub use service::{
    labels_match, Labels, Locality, NetworkEndpoint, Port, Protocol, Resolution, Service,
    ServiceInstance,
};
