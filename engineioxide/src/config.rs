//! Configuration for an [`EngineIo`](crate::engine::EngineIo) server.

use std::time::Duration;

/// Configuration for an engine.io server.
#[derive(Debug, Clone)]
pub struct EngineIoConfig {
    /// The interval between two pings sent by the server. Default is 25 seconds.
    pub ping_interval: Duration,
    /// How long the server waits for a pong after a ping before considering
    /// the session dead. Default is 20 seconds.
    pub ping_timeout: Duration,
    /// The maximum size in bytes of a single incoming packet. Default is 100kb.
    pub max_payload: u64,
    /// The depth of the bounded egress queue for each session. Default is 128.
    pub max_buffer_size: usize,
    /// The HTTP path this server is mounted at. Default is `/engine.io/`.
    pub req_path: String,
}

impl Default for EngineIoConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(20_000),
            max_payload: 1e6 as u64,
            max_buffer_size: 128,
            req_path: "/engine.io/".to_string(),
        }
    }
}

impl EngineIoConfig {
    /// Creates a new builder with the default configuration.
    pub fn builder() -> EngineIoConfigBuilder {
        EngineIoConfigBuilder::new()
    }
}

/// A builder for [`EngineIoConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineIoConfigBuilder {
    config: EngineIoConfig,
}

impl EngineIoConfigBuilder {
    /// Creates a new builder seeded with [`EngineIoConfig::default`].
    pub fn new() -> Self {
        Self {
            config: EngineIoConfig::default(),
        }
    }

    /// Sets the ping interval.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Sets the ping timeout.
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.ping_timeout = timeout;
        self
    }

    /// Sets the maximum accepted payload size.
    pub fn max_payload(mut self, max_payload: u64) -> Self {
        self.config.max_payload = max_payload;
        self
    }

    /// Sets the depth of the bounded egress queue.
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.config.max_buffer_size = size;
        self
    }

    /// Sets the HTTP path this server is mounted at.
    pub fn req_path(mut self, path: impl Into<String>) -> Self {
        self.config.req_path = path.into();
        self
    }

    /// Builds the final [`EngineIoConfig`].
    pub fn build(self) -> EngineIoConfig {
        self.config
    }
}
