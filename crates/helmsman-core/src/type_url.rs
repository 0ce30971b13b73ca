//! Type URL handling for discovery resources.

use std::fmt;

/// Type URL wrapper for discovery resource types.
///
/// Type URLs identify the wire message type of pushed resources. Requests
/// carrying anything other than the four recognized URLs are logged and
/// ignored by the stream loop.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeUrl(String);

impl TypeUrl {
    /// Type URL for Cluster (CDS).
    pub const CLUSTER: &'static str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

    /// Type URL for ClusterLoadAssignment (EDS).
    pub const ENDPOINT: &'static str =
        "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

    /// Type URL for Listener (LDS).
    pub const LISTENER: &'static str = "type.googleapis.com/envoy.config.listener.v3.Listener";

    /// Type URL for RouteConfiguration (RDS).
    pub const ROUTE: &'static str =
        "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

    /// Create a new type URL from a string.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Get the type URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the short name, e.g. `Cluster` for the CDS type URL.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.0
            .rsplit('/')
            .next()
            .and_then(|s| s.rsplit('.').next())
            .unwrap_or(&self.0)
    }

    /// Whether this is one of the four type URLs the server recognizes.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        matches!(
            self.0.as_str(),
            Self::CLUSTER | Self::ENDPOINT | Self::LISTENER | Self::ROUTE
        )
    }
}

impl fmt::Display for TypeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TypeUrl {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TypeUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names() {
        assert_eq!(TypeUrl::new(TypeUrl::CLUSTER).short_name(), "Cluster");
        assert_eq!(
            TypeUrl::new(TypeUrl::ENDPOINT).short_name(),
            "ClusterLoadAssignment"
        );
    }

    #[test]
    fn recognized_urls() {
        assert!(TypeUrl::new(TypeUrl::CLUSTER).is_recognized());
        assert!(TypeUrl::new(TypeUrl::ROUTE).is_recognized());
        assert!(!TypeUrl::new("type.googleapis.com/envoy.service.runtime.v3.Runtime").is_recognized());
    }
}
