//! Client configuration: reconnection backoff and the wire codec.

use std::time::Duration;

use socketioxide::packet::Codec;

/// Configuration for a client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whether a dropped connection is retried automatically. Default `true`.
    pub reconnection: bool,
    /// The delay before the first reconnect attempt. Default 1s.
    pub reconnect_min_delay: Duration,
    /// The cap the exponential backoff never exceeds. Default 5s.
    pub reconnect_max_delay: Duration,
    /// An upper bound on reconnect attempts before giving up entirely.
    /// `None` (the default) retries forever.
    pub reconnect_max_attempts: Option<u32>,
    /// How long `ClientSocket::emit_with_ack` waits before timing out.
    /// Default 5s.
    pub ack_timeout: Duration,
    /// Which of the two wire codecs this client speaks.
    pub codec: Codec,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnection: true,
            reconnect_min_delay: Duration::from_millis(1_000),
            reconnect_max_delay: Duration::from_millis(5_000),
            reconnect_max_attempts: None,
            ack_timeout: Duration::from_secs(5),
            codec: Codec::Default,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// A builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn reconnection(mut self, enabled: bool) -> Self {
        self.config.reconnection = enabled;
        self
    }

    pub fn reconnect_min_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_min_delay = delay;
        self
    }

    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_max_delay = delay;
        self
    }

    pub fn reconnect_max_attempts(mut self, attempts: u32) -> Self {
        self.config.reconnect_max_attempts = Some(attempts);
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    #[cfg(feature = "msgpack")]
    pub fn with_msgpack(mut self) -> Self {
        self.config.codec = Codec::Msgpack;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
