//! Data-plane node identity.
//!
//! Every proxy identifies itself on the first request of a stream with a
//! node id of the form `type~ip~id~domain`. The parsed identity is invariant
//! for the life of the connection and selects which listener and cluster
//! families the generators produce.

use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Role of a data-plane proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Co-located with a workload; gets inbound, outbound and virtual listeners.
    Sidecar,
    /// Edge proxy terminating inbound mesh traffic.
    Ingress,
    /// Standalone gateway; gets a listener set per gateway definition.
    Router,
}

impl NodeType {
    /// Parse the node-type field of a node id.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sidecar" => Some(NodeType::Sidecar),
            "ingress" => Some(NodeType::Ingress),
            "router" => Some(NodeType::Router),
            _ => None,
        }
    }

    /// Wire spelling of this node type.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Sidecar => "sidecar",
            NodeType::Ingress => "ingress",
            NodeType::Router => "router",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed identity of a connected proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyNode {
    /// Proxy role.
    pub node_type: NodeType,
    /// IP address the proxy reports for itself.
    pub ip: String,
    /// Unique id, typically `name.namespace`.
    pub id: String,
    /// DNS domain the proxy's services live under.
    pub domain: String,
    /// Free-form metadata from the node's bootstrap.
    pub metadata: BTreeMap<String, String>,
}

impl ProxyNode {
    /// Parse a wire node id of the form `type~ip~id~domain`.
    pub fn parse(node_id: &str) -> Result<Self> {
        let parts: Vec<&str> = node_id.split('~').collect();
        if parts.len() != 4 {
            return Err(Error::InvalidNodeId {
                id: node_id.to_string(),
                reason: format!("expected 4 '~' separated fields, got {}", parts.len()),
            });
        }

        let node_type = NodeType::parse(parts[0]).ok_or_else(|| Error::InvalidNodeId {
            id: node_id.to_string(),
            reason: format!("unknown node type {:?}", parts[0]),
        })?;

        Ok(ProxyNode {
            node_type,
            ip: parts[1].to_string(),
            id: parts[2].to_string(),
            domain: parts[3].to_string(),
            metadata: BTreeMap::new(),
        })
    }

    /// Extract string-valued metadata from the wire `Node.metadata` struct.
    ///
    /// Non-string values are ignored; the control plane only consumes string
    /// keys such as the interception mode.
    pub fn parse_metadata(metadata: Option<&prost_types::Struct>) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if let Some(s) = metadata {
            for (key, value) in &s.fields {
                if let Some(prost_types::value::Kind::StringValue(v)) = &value.kind {
                    out.insert(key.clone(), v.clone());
                }
            }
        }
        out
    }

    /// Re-encode this identity as a wire node id.
    pub fn service_node(&self) -> String {
        format!(
            "{}~{}~{}~{}",
            self.node_type.as_str(),
            self.ip,
            self.id,
            self.domain
        )
    }
}

impl fmt::Display for ProxyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service_node())
    }
}
