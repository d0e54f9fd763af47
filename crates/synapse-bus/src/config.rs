//! Bus configuration.

use std::time::Duration;

/// Default heartbeat sweep interval.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default idle delay for the dispatch loop when the queue is empty.
const DEFAULT_DISPATCH_IDLE_DELAY: Duration = Duration::from_millis(25);

/// Default correlated-response timeout.
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Message bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// The local component id. Skipped by the heartbeat sweep and used
    /// as the source of synthesized failure responses.
    pub self_id: String,
    /// Heartbeat sweep interval. A component is marked offline when its
    /// last heartbeat is older than twice this.
    pub heartbeat_interval: Duration,
    /// How long the dispatch loop sleeps when the queue is empty.
    pub dispatch_idle_delay: Duration,
    /// How long a correlated request waits before rejecting.
    pub response_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            self_id: "synapse-core".to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            dispatch_idle_delay: DEFAULT_DISPATCH_IDLE_DELAY,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}
