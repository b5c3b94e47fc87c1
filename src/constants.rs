//! Application-wide constants for pulsewire.
//!
//! This module centralizes the timing constants that define the push
//! channel's liveness behavior, grouped by domain with documentation
//! explaining their purpose.
//!
//! # Categories
//!
//! - **Heartbeat**: keep-alive cadence on the push channel
//! - **Reconnection**: backoff bounds for the retry schedule
//! - **Notifications**: display-lifetime defaults

use std::time::Duration;

// ============================================================================
// Heartbeat
// ============================================================================

/// Interval between client-side keep-alive pings on the push channel.
///
/// Intermediary infrastructure (proxies, load balancers) commonly drops
/// idle connections after 30-60 seconds; pinging every 25 seconds keeps
/// the channel under those thresholds. The server's pong reply carries no
/// acknowledgement semantics and is discarded.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

// ============================================================================
// Reconnection
// ============================================================================

/// Delay before the first reconnection attempt.
///
/// Doubles on each consecutive failure until [`MAX_BACKOFF`] is reached.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);

/// Ceiling on the reconnection delay.
///
/// Uncapped doubling would grow toward impractical delays; 30 seconds
/// keeps a permanently unreachable server from pushing recovery minutes
/// out once it comes back.
pub const MAX_BACKOFF: Duration = Duration::from_millis(30_000);

// ============================================================================
// Notifications
// ============================================================================

/// Default display lifetime for a notification, in milliseconds.
///
/// Applied when an inbound payload carries no `duration` field. A
/// duration of zero or below disables auto-dismiss entirely; the item
/// then persists until manually removed or the store is cleared.
pub const DEFAULT_DISMISS_MS: i64 = 6000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_beats_common_idle_timeouts() {
        // Must stay under the 30s idle cutoff typical of intermediaries
        assert!(HEARTBEAT_INTERVAL < Duration::from_secs(30));
        assert!(HEARTBEAT_INTERVAL >= Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_bounds_ordering() {
        assert!(INITIAL_BACKOFF < MAX_BACKOFF);
        assert_eq!(INITIAL_BACKOFF, Duration::from_secs(1));
        assert_eq!(MAX_BACKOFF, Duration::from_secs(30));
    }

    #[test]
    fn test_default_dismiss_is_positive() {
        assert!(DEFAULT_DISMISS_MS > 0);
    }
}
