//! Client configuration.

use std::time::Duration;

/// Twitch PubSub endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://pubsub-edge.twitch.tv";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// websocket endpoint url
    pub endpoint: String,
    /// time between two PING messages, the server has no heartbeat of its own
    pub ping_interval: Duration,
    /// max time to wait UNLISTEN messages being written on shutdown
    pub unlisten_timeout: Duration,
    /// buffered items per observation stream before slow receivers lag
    pub observer_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            ping_interval: Duration::from_secs(60),
            unlisten_timeout: Duration::from_secs(5),
            observer_capacity: 64,
        }
    }
}

impl Config {
    /// Use another endpoint
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Change ping interval
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Change unlisten timeout
    pub fn with_unlisten_timeout(mut self, timeout: Duration) -> Self {
        self.unlisten_timeout = timeout;
        self
    }

    /// Change observation stream capacity
    pub fn with_observer_capacity(mut self, capacity: usize) -> Self {
        self.observer_capacity = capacity;
        self
    }
}
