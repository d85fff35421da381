//! Client configuration.

use std::time::Duration;

use crate::network::DEFAULT_REALTIME_URL;

/// Realtime client configuration
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint. The auth token is appended as a query parameter
    /// at connect time.
    pub url: String,
    /// Timeout for the connection handshake
    pub connect_timeout: Duration,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay for exponential backoff
    pub max_delay: Duration,
    /// Backoff growth factor per attempt
    pub decay: f64,
    /// Reconnect attempts before giving up. `None` retries indefinitely,
    /// which is the right default for a dashboard session.
    pub max_reconnect_attempts: Option<u32>,
    /// Interval between heartbeat pings while open
    pub ping_interval: Duration,
    /// How often the inactivity watchdog wakes up
    pub watchdog_interval: Duration,
    /// Idle window after which a connection claiming to be open is
    /// considered dead and forcibly reconnected
    pub max_idle: Duration,
    /// Capacity of the outbound queue. Oldest entries are evicted first
    /// under sustained disconnection.
    pub queue_capacity: usize,
    /// Capacity of the channel feeding the transport writer
    pub wire_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REALTIME_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            decay: 2.0,
            max_reconnect_attempts: None,
            ping_interval: Duration::from_secs(30),
            watchdog_interval: Duration::from_secs(60),
            max_idle: Duration::from_secs(300),
            queue_capacity: 100,
            wire_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RealtimeConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.decay, 2.0);
        assert_eq!(config.max_reconnect_attempts, None);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.watchdog_interval, Duration::from_secs(60));
        assert_eq!(config.max_idle, Duration::from_secs(300));
        assert_eq!(config.queue_capacity, 100);
    }
}
