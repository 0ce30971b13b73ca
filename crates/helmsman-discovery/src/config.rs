//! Discovery server configuration.

use std::time::Duration;

/// Timeouts and drain settings for the discovery server.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Max time to wait when signalling a connection's push channel during a
    /// broadcast. A stuck client fails its signal after this long and the
    /// broadcast moves on.
    pub push_timeout: Duration,
    /// Max time to wait for a response send to complete. A client that is
    /// not reading trips this and its stream is closed.
    pub send_timeout: Duration,
    /// How long to keep serving after a shutdown signal, for connection
    /// draining.
    pub grace_period: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            push_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            grace_period: Duration::from_secs(30),
        }
    }
}
