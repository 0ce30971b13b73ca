//! # helmsman-gen
//!
//! Pure translation from the abstract service model to proxy-ready
//! resources. [`ConfigGenerator`] exposes one entry point per resource type:
//!
//! - [`ConfigGenerator::build_clusters`] - CDS output
//! - [`ConfigGenerator::build_listeners`] - LDS output
//! - [`ConfigGenerator::build_route_config`] - RDS output
//! - [`ConfigGenerator::build_endpoints`] - EDS output
//!
//! Generators hold no mutable state; everything derives from the
//! [`Environment`] facade at call time. Extension hooks run through the
//! ordered [`Plugin`] chain.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cluster;
mod endpoint;
mod listener;
mod metrics;
mod plugin;
mod route;

pub use crate::metrics::GeneratorMetrics;
pub use plugin::{
    ClusterParams, ListenerParams, MutableListener, Plugin, PluginFilterChain,
};

use std::collections::HashMap;

use helmsman_api::cluster::Cluster;
use helmsman_api::endpoint::ClusterLoadAssignment;
use helmsman_api::listener::Listener;
use helmsman_api::route::RouteConfiguration;
use helmsman_core::{ProxyNode, Result};
use helmsman_model::Environment;

/// Translates the service model into proxy resources.
pub struct ConfigGenerator {
    plugins: Vec<Box<dyn Plugin>>,
    metrics: GeneratorMetrics,
}

impl ConfigGenerator {
    /// A generator with no plugins.
    pub fn new() -> Self {
        Self::with_plugins(Vec::new())
    }

    /// A generator with the given plugin chain; hooks run in order.
    pub fn with_plugins(plugins: Vec<Box<dyn Plugin>>) -> Self {
        ConfigGenerator {
            plugins,
            metrics: GeneratorMetrics::new(),
        }
    }

    /// Generator diagnostics counters.
    pub fn metrics(&self) -> &GeneratorMetrics {
        &self.metrics
    }

    pub(crate) fn plugins(&self) -> &[Box<dyn Plugin>] {
        &self.plugins
    }

    /// Build the full cluster set for a node.
    ///
    /// Outbound clusters for every service/port (plus one per destination
    /// rule subset), inbound clusters for sidecars, and the blackhole sink.
    pub fn build_clusters(&self, env: &dyn Environment, node: &ProxyNode) -> Result<Vec<Cluster>> {
        cluster::build_clusters(self, env, node)
    }

    /// Build the full listener set for a node.
    pub fn build_listeners(&self, env: &dyn Environment, node: &ProxyNode) -> Result<Vec<Listener>> {
        listener::build_listeners(self, env, node)
    }

    /// Build the outbound HTTP route configuration named `route_name`
    /// (a port number string, or the HTTP proxy literal).
    pub fn build_route_config(
        &self,
        env: &dyn Environment,
        node: &ProxyNode,
        route_name: &str,
    ) -> Result<RouteConfiguration> {
        route::build_outbound_route_config(env, node, route_name)
    }

    /// Recompute the endpoint assignment for a single cluster.
    pub fn build_endpoint(
        &self,
        env: &dyn Environment,
        cluster_name: &str,
    ) -> Result<ClusterLoadAssignment> {
        endpoint::build_endpoint(env, cluster_name)
    }

    /// Recompute endpoint assignments for a set of clusters. Per-cluster
    /// failures are logged and skipped; the remaining assignments are
    /// returned.
    pub fn build_endpoints(
        &self,
        env: &dyn Environment,
        clusters: &[String],
    ) -> HashMap<String, ClusterLoadAssignment> {
        endpoint::build_endpoints(env, clusters)
    }
}

impl Default for ConfigGenerator {
    fn default() -> Self {
        Self::new()
    }
}
