//! Configuration for a [`SocketIo`](crate::SocketIo) server.

use std::time::Duration;

use engineioxide::EngineIoConfig;

use crate::packet::Codec;

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a socket.io server, layered on top of the
/// engine.io transport configuration it carries.
#[derive(Debug, Clone)]
pub struct SocketIoConfig {
    /// Transport-level handshake/heartbeat/payload settings (spec §4.4).
    pub engine_config: EngineIoConfig,
    /// Default bound on how long `emit_with_ack` waits for a reply, absent
    /// an explicit `.timeout(..)` override (spec §4.6).
    pub ack_timeout: Duration,
    /// Which wire codec this server speaks (spec §4.1/§4.2). All namespaces
    /// on one server share one codec.
    pub codec: Codec,
}

impl Default for SocketIoConfig {
    fn default() -> Self {
        let mut engine_config = EngineIoConfig::default();
        // spec §6: the socket.io application layer's default mount path is
        // `/socket.io/`, distinct from engine.io's own bare default.
        engine_config.req_path = "/socket.io/".to_string();
        Self {
            engine_config,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            codec: Codec::default(),
        }
    }
}

impl SocketIoConfig {
    pub fn builder() -> SocketIoConfigBuilder {
        SocketIoConfigBuilder::new()
    }
}

/// A builder for [`SocketIoConfig`].
#[derive(Debug, Clone, Default)]
pub struct SocketIoConfigBuilder {
    config: SocketIoConfig,
}

impl SocketIoConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SocketIoConfig::default(),
        }
    }

    /// Overrides the transport-level engine.io configuration wholesale.
    pub fn engine_config(mut self, config: EngineIoConfig) -> Self {
        self.config.engine_config = config;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.engine_config.ping_interval = interval;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine_config.ping_timeout = timeout;
        self
    }

    pub fn max_payload(mut self, max_payload: u64) -> Self {
        self.config.engine_config.max_payload = max_payload;
        self
    }

    pub fn req_path(mut self, path: impl Into<String>) -> Self {
        self.config.engine_config.req_path = path.into();
        self
    }

    /// Sets the default ack wait bound used when no `.timeout(..)` is given.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Selects the single-blob MessagePack codec instead of the default
    /// text+binary framing (spec §4.2). Requires the `msgpack` feature.
    #[cfg(feature = "msgpack")]
    pub fn with_msgpack(mut self) -> Self {
        self.config.codec = Codec::Msgpack;
        self
    }

    pub fn build(self) -> SocketIoConfig {
        self.config
    }
}
