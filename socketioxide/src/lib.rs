//! A socket.io server: namespace- and room-aware realtime messaging on top
//! of the transport-level session `engineioxide` provides (spec §3, §4.5,
//! §4.6).
//!
//! [`SocketIo`] is the entry point: register namespaces with [`SocketIo::ns`],
//! then mount [`SocketIo::layer`] on any `tower`-compatible HTTP server.

pub mod ack;
pub mod adapter;
pub mod client;
pub mod config;
pub mod errors;
pub mod handler;
pub mod ns;
pub mod operators;
pub mod packet;
pub mod socket;
pub mod value;

use std::sync::Arc;

use engineioxide::EngineIoLayer;

use adapter::{Adapter, LocalAdapter};
use client::Client;
use config::{SocketIoConfig, SocketIoConfigBuilder};
use handler::ConnectHandler;
use ns::Namespace;

pub use errors::Error;
pub use socket::{DisconnectReason, Socket};
pub use value::Value;

/// The server-side façade: owns every namespace and the shared engine.io
/// transport configuration (spec §4.5, §4.6).
pub struct SocketIo<A: Adapter = LocalAdapter> {
    client: Arc<Client<A>>,
    config: Arc<SocketIoConfig>,
}

impl<A: Adapter> Clone for SocketIo<A> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
        }
    }
}

impl SocketIo<LocalAdapter> {
    /// Creates a server using the default configuration and the in-process
    /// [`LocalAdapter`] (spec §9 design note: rooms are per-process).
    pub fn new() -> Self {
        Self::with_config(SocketIoConfig::default())
    }
}

impl Default for SocketIo<LocalAdapter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Adapter> SocketIo<A> {
    pub fn builder() -> SocketIoConfigBuilder {
        SocketIoConfigBuilder::new()
    }

    pub fn with_config(config: SocketIoConfig) -> Self {
        let config = Arc::new(config);
        Self {
            client: Arc::new(Client::new(config.clone())),
            config,
        }
    }

    /// Registers a namespace at `path`, invoking `connect_handler` once per
    /// socket that completes the `CONNECT` handshake against it (spec §4.5,
    /// §4.6 `OnConnect`).
    pub fn ns(&self, path: impl Into<String>, connect_handler: impl ConnectHandler<A>) -> &Self {
        self.client.add_ns(path, connect_handler);
        self
    }

    /// Looks up a previously registered namespace.
    pub fn of(&self, path: &str) -> Option<Arc<Namespace<A>>> {
        self.client.get_ns(path)
    }

    /// Builds the `tower::Layer` to mount this server on an HTTP router.
    pub fn layer(&self) -> EngineIoLayer<Arc<Client<A>>> {
        EngineIoLayer::from_config(self.client.clone(), self.config.engine_config.clone())
    }

    /// Closes every namespace's sockets, for graceful shutdown.
    pub fn close(&self) {
        self.client.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_looks_up_a_namespace() {
        let io = SocketIo::<LocalAdapter>::new();
        io.ns("/chat", |_socket: Arc<Socket<LocalAdapter>>| {});
        assert!(io.of("/chat").is_some());
        assert!(io.of("/missing").is_none());
    }

    #[test]
    fn unregistered_namespaces_stay_absent() {
        let io = SocketIo::<LocalAdapter>::new();
        assert!(io.of("/anything").is_none());
    }
}
