//! # helmsman-discovery
//!
//! The discovery server: the authoritative publisher of proxy configuration.
//!
//! Proxies open bidirectional streams (ADS for everything, EDS for endpoints
//! only), subscribe to resource types, and acknowledge pushes. Whenever the
//! registry or routing configuration changes, the change notifier calls
//! [`DiscoveryServer::broadcast`] and every connected proxy is re-pushed the
//! resource types it watches.
//!
//! Structure:
//!
//! - [`connection`] - per-stream connection state
//! - [`registry`] - process-wide index of live connections
//! - [`eds`] - secondary index of endpoint watchers per cluster
//! - [`push`] - the change-driven fan-out loop
//! - [`stream`] - the per-connection request/push multiplexer
//! - [`service`] - the tonic service glue
//! - [`diag`] - read-only operator diagnostics

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod connection;
pub mod diag;
mod eds;
pub mod metrics;
mod push;
mod registry;
pub mod service;
pub mod shutdown;
mod stream;


pub use config::DiscoveryConfig;
pub use connection::XdsConnection;
pub use service::DiscoveryService;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use helmsman_gen::ConfigGenerator;
use helmsman_model::Environment;

use crate::eds::EdsIndex;
use crate::metrics::DiscoveryMetrics;
use crate::registry::ClientRegistry;

/// The discovery server.
///
/// Owns the client registry, the EDS cluster index, the config generator and
/// the environment handle; handlers receive it explicitly - there is no
/// ambient global state.
pub struct DiscoveryServer {
    env: Arc<dyn Environment>,
    generator: ConfigGenerator,
    registry: ClientRegistry,
    eds: EdsIndex,
    config: DiscoveryConfig,
    metrics: Arc<DiscoveryMetrics>,
    conn_counter: AtomicU64,
}

impl DiscoveryServer {
    /// Create a server with default timeouts.
    pub fn new(env: Arc<dyn Environment>, generator: ConfigGenerator) -> Self {
        Self::with_config(env, generator, DiscoveryConfig::default())
    }

    /// Create a server with explicit timeouts.
    pub fn with_config(
        env: Arc<dyn Environment>,
        generator: ConfigGenerator,
        config: DiscoveryConfig,
    ) -> Self {
        let metrics = Arc::new(DiscoveryMetrics::new());
        DiscoveryServer {
            env,
            generator,
            registry: ClientRegistry::new(Arc::clone(&metrics)),
            eds: EdsIndex::new(),
            config,
            metrics,
            conn_counter: AtomicU64::new(0),
        }
    }

    /// The environment this server reads from.
    pub fn env(&self) -> &dyn Environment {
        self.env.as_ref()
    }

    /// The config generator.
    pub fn generator(&self) -> &ConfigGenerator {
        &self.generator
    }

    /// Server timeouts.
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discovery metrics.
    pub fn metrics(&self) -> &DiscoveryMetrics {
        &self.metrics
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub(crate) fn eds(&self) -> &EdsIndex {
        &self.eds
    }

    /// Assign a connection id: a monotonically increasing counter combined
    /// with the node id.
    pub(crate) fn next_conn_id(&self, node_id: &str) -> String {
        let n = self.conn_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", node_id, n)
    }
}
