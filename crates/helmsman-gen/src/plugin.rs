//! Extension hooks over generated listeners and clusters.
//!
//! Plugins mutate resources while they are being built: a listener hook may
//! append filters to any chain, a cluster hook may adjust cluster fields.
//! The chain is ordered; every hook sees the effects of earlier plugins.
//! Plugins never participate in the push loop.

use helmsman_api::cluster::Cluster;
use helmsman_api::filter::HttpFilter;
use helmsman_api::listener::{Filter, Listener};
use helmsman_core::{ProxyNode, Result};
use helmsman_model::{Environment, Port, Service, ServiceInstance};

/// Filters a plugin wants attached to one filter chain.
///
/// TCP and HTTP filters are collected separately and merged during filter
/// finalization; a chain may receive one kind only.
#[derive(Default)]
pub struct PluginFilterChain {
    /// Network filters, prepended to the chain's own network filters.
    pub tcp: Vec<Filter>,
    /// HTTP filters, inserted ahead of the default HTTP filter stack.
    pub http: Vec<HttpFilter>,
}

/// A listener under construction, open for plugin mutation.
///
/// `chains` parallels `listener.filter_chains`: the filters collected in
/// `chains[i]` are merged into `listener.filter_chains[i]` once all plugins
/// have run.
pub struct MutableListener {
    /// The listener being built.
    pub listener: Listener,
    /// Per-chain plugin filters, same order as the listener's chains.
    pub chains: Vec<PluginFilterChain>,
}

impl MutableListener {
    pub(crate) fn new(listener: Listener) -> Self {
        let chains = listener
            .filter_chains
            .iter()
            .map(|_| PluginFilterChain::default())
            .collect();
        MutableListener { listener, chains }
    }
}

/// Inputs for listener hooks.
pub struct ListenerParams<'a> {
    /// The model facade.
    pub env: &'a dyn Environment,
    /// The proxy the listener is generated for.
    pub node: &'a ProxyNode,
    /// Instances co-located with the proxy.
    pub proxy_instances: &'a [ServiceInstance],
    /// The destination service, for outbound listeners.
    pub service: Option<&'a Service>,
    /// The local instance, for inbound listeners.
    pub instance: Option<&'a ServiceInstance>,
}

/// Inputs for cluster hooks.
pub struct ClusterParams<'a> {
    /// The model facade.
    pub env: &'a dyn Environment,
    /// The proxy the cluster is generated for.
    pub node: &'a ProxyNode,
    /// Hostname of the service the cluster targets.
    pub service_hostname: &'a str,
    /// The service port the cluster targets.
    pub port: &'a Port,
}

/// An ordered extension over generated listeners and clusters.
///
/// All hooks default to no-ops so plugins implement only what they need.
pub trait Plugin: Send + Sync {
    /// Called for each outbound listener before filter finalization.
    fn on_outbound_listener(
        &self,
        _params: &ListenerParams<'_>,
        _mutable: &mut MutableListener,
    ) -> Result<()> {
        Ok(())
    }

    /// Called for each inbound listener before filter finalization.
    fn on_inbound_listener(
        &self,
        _params: &ListenerParams<'_>,
        _mutable: &mut MutableListener,
    ) -> Result<()> {
        Ok(())
    }

    /// Called for each outbound cluster (default and subset alike).
    fn on_outbound_cluster(&self, _params: &ClusterParams<'_>, _cluster: &mut Cluster) {}

    /// Called for each inbound cluster.
    fn on_inbound_cluster(&self, _params: &ClusterParams<'_>, _cluster: &mut Cluster) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmsman_api::listener::FilterChain;

    #[test]
    fn mutable_listener_tracks_chains() {
        let listener = Listener {
            name: "0.0.0.0_80".to_string(),
            filter_chains: vec![FilterChain::default(), FilterChain::default()],
            ..Default::default()
        };
        let mutable = MutableListener::new(listener);
        assert_eq!(mutable.chains.len(), 2);
    }
}
