//! An async socket.io client: dials a server, speaks the engine.io
//! handshake and heartbeat over websocket, and multiplexes namespace
//! sockets over that one connection — the client-side counterpart of
//! `socketioxide`'s server façade, sharing its packet codec and value
//! types (spec §4.8, C10).
//!
//! [`Client::dial`] is the entry point: it blocks until the engine.io
//! handshake completes, then [`Client::of`] joins a namespace and returns a
//! [`Socket`] with the same `on`/`on_connect`/`on_disconnect`/`on_error`/
//! `emit`/`emit_with_ack` surface the server exposes (minus rooms, which
//! the GLOSSARY scopes to the server).

pub mod config;
pub mod engine;
pub mod errors;
pub mod handler;
mod router;
pub mod socket;

use std::sync::Arc;

use url::Url;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use errors::Error;
pub use socket::{DisconnectReason, Socket};
pub use socketioxide::Value;

use engine::EngineSocket;
use router::ClientRouter;

/// A connected socket.io client: one engine.io connection plus every
/// namespace socket multiplexed over it.
pub struct Client {
    engine: Arc<EngineSocket<ClientRouter>>,
    router: Arc<ClientRouter>,
}

impl Client {
    /// Dials `url`, performs the websocket-only engine.io handshake, and
    /// returns once the connection is open. The reconnect loop (spec §4.5
    /// client half) starts automatically and runs for the lifetime of the
    /// returned `Client`.
    pub async fn dial(url: &str, config: ClientConfig) -> Result<Arc<Self>, Error> {
        let url = Url::parse(url)?;
        let router = Arc::new(ClientRouter::new(config.codec, config.ack_timeout));
        let engine = EngineSocket::connect(url, config, router.clone()).await?;
        Ok(Arc::new(Self { engine, router }))
    }

    /// Joins (or returns the already-joined) socket bound to `path`. Sends
    /// the namespace `CONNECT` request immediately; the returned socket
    /// reports [`Socket::connected`] once the server's reply arrives (spec
    /// §4.6 "Connect handshake").
    pub fn of(self: &Arc<Self>, path: &str) -> Arc<Socket> {
        self.router.of(path)
    }

    /// This connection's engine.io session id, once the handshake has
    /// completed.
    pub fn id(&self) -> Option<engineioxide::Sid> {
        self.engine.sid()
    }

    pub fn connected(&self) -> bool {
        self.engine.is_connected()
    }

    /// Closes the engine.io connection permanently; no further reconnect
    /// attempt follows (spec §4.4 "either side may initiate CLOSE").
    pub fn disconnect(&self) {
        self.engine.disconnect();
    }

    /// Resolves once the connection has closed permanently (reconnection
    /// exhausted or [`Client::disconnect`] called).
    pub async fn closed(&self) {
        self.engine.closed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_defaults_match_the_documented_values() {
        let config = ClientConfig::default();
        assert!(config.reconnection);
        assert_eq!(config.reconnect_max_attempts, None);
    }
}
