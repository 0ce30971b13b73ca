//! Response versioning and nonce generation.
//!
//! `version_info` is a process-wide monotonic config version, bumped once per
//! broadcast; nonces are unique per response. Both are opaque to clients and
//! used only for log correlation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static CONFIG_VERSION: AtomicU64 = AtomicU64::new(1);
static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The current config version as carried in `DiscoveryResponse.version_info`.
pub fn version_info() -> String {
    CONFIG_VERSION.load(Ordering::Relaxed).to_string()
}

/// Advance the config version; called once per broadcast.
///
/// Returns the new version.
pub fn bump_version() -> u64 {
    CONFIG_VERSION.fetch_add(1, Ordering::Relaxed) + 1
}

/// Generate a unique nonce for a discovery response.
///
/// Combines a nanosecond timestamp with an atomic counter so nonces stay
/// unique under concurrency.
pub fn nonce() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let count = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", timestamp, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_unique() {
        let n1 = nonce();
        let n2 = nonce();
        assert_ne!(n1, n2);
    }

    #[test]
    fn version_is_monotonic() {
        let before: u64 = version_info().parse().unwrap();
        let bumped = bump_version();
        assert!(bumped > before);
        let after: u64 = version_info().parse().unwrap();
        assert_eq!(after, bumped);
    }
}
