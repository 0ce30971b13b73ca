//! Canonical resource naming.
//!
//! Cluster names follow the `<direction>|<port>|<subset>|<hostname>` encoding
//! shared by listeners, routes and endpoint assignments; the pieces refer to
//! each other by name only, never by pointer. Names are bounded in length:
//! over-long names are truncated with an FNV hash suffix so two distinct
//! inputs never collide after truncation.

use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;

/// Name of the static sink cluster for unmatched traffic.
pub const BLACKHOLE_CLUSTER: &str = "BlackHoleCluster";

/// Name of the catch-all intercept listener.
pub const VIRTUAL_LISTENER: &str = "virtual";

/// Route config name for the HTTP proxy aggregate.
pub const RDS_HTTP_PROXY: &str = "http_proxy";

/// Hostname used for inbound management-port clusters.
pub const MANAGEMENT_CLUSTER_HOSTNAME: &str = "mgmtCluster";

/// Upper bound on generated cluster names; the proxy uses names in stats
/// tags, which are length-limited.
pub const MAX_CLUSTER_NAME_LEN: usize = 189;

const HASH_SUFFIX_LEN: usize = 16;

/// Whether a cluster serves traffic leaving or entering the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficDirection {
    /// Traffic from the proxy to another service.
    Outbound,
    /// Traffic terminating at a workload behind the proxy.
    Inbound,
}

impl TrafficDirection {
    /// Wire spelling used in cluster names.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficDirection::Outbound => "outbound",
            TrafficDirection::Inbound => "inbound",
        }
    }

    /// Parse the direction component of a cluster name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "outbound" => Some(TrafficDirection::Outbound),
            "inbound" => Some(TrafficDirection::Inbound),
            _ => None,
        }
    }
}

impl fmt::Display for TrafficDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the canonical cluster name for a service/port/subset triple.
///
/// The subset is empty for the default cluster. The result is length-bounded;
/// see [`truncate_cluster_name`].
pub fn subset_key(
    direction: TrafficDirection,
    port: u16,
    subset: &str,
    hostname: &str,
) -> String {
    truncate_cluster_name(format!("{}|{}|{}|{}", direction, port, subset, hostname))
}

/// Components of a parsed cluster name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetKey {
    /// Traffic direction.
    pub direction: TrafficDirection,
    /// Service port.
    pub port: u16,
    /// Subset name; empty for the default cluster.
    pub subset: String,
    /// Service hostname.
    pub hostname: String,
}

/// Parse a canonical cluster name back into its components.
///
/// Returns `None` for names that do not follow the encoding (the blackhole
/// cluster, truncated names, foreign clusters).
pub fn parse_subset_key(name: &str) -> Option<SubsetKey> {
    let mut parts = name.splitn(4, '|');
    let direction = TrafficDirection::parse(parts.next()?)?;
    let port = parts.next()?.parse().ok()?;
    let subset = parts.next()?.to_string();
    let hostname = parts.next()?.to_string();
    if hostname.is_empty() {
        return None;
    }
    Some(SubsetKey {
        direction,
        port,
        subset,
        hostname,
    })
}

/// Bound a cluster name to [`MAX_CLUSTER_NAME_LEN`].
///
/// Names within the bound pass through untouched. Longer names keep a prefix
/// and gain a 16-hex-digit FNV-1a suffix of the full original name, so
/// logically distinct inputs keep distinct truncations.
pub fn truncate_cluster_name(name: String) -> String {
    if name.len() <= MAX_CLUSTER_NAME_LEN {
        return name;
    }

    let mut hasher = FnvHasher::default();
    hasher.write(name.as_bytes());
    let suffix = format!("{:016x}", hasher.finish());

    let keep = MAX_CLUSTER_NAME_LEN - HASH_SUFFIX_LEN - 1;
    // Respect char boundaries; hostnames are ASCII in practice but the
    // truncation must not panic on arbitrary input.
    let mut prefix_end = keep;
    while !name.is_char_boundary(prefix_end) {
        prefix_end -= 1;
    }
    format!("{}-{}", &name[..prefix_end], suffix)
}
