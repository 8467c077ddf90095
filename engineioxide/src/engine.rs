//! The session registry shared by every transport (spec §3 "Engine server").

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::EngineIoConfig;
use crate::handler::EngineIoHandler;
use crate::sid::Sid;
use crate::socket::{DisconnectReason, Socket};
use crate::transport::TransportType;

/// Owns every live session for one engine.io mount point and dispatches
/// transport-level events to the configured [`EngineIoHandler`].
pub struct EngineIo<H: EngineIoHandler> {
    pub config: EngineIoConfig,
    pub handler: H,
    sessions: DashMap<Sid, Arc<Socket<H::Data>>>,
}

impl<H: EngineIoHandler> EngineIo<H> {
    pub fn new(handler: H) -> Arc<Self> {
        Self::with_config(handler, EngineIoConfig::default())
    }

    pub fn with_config(handler: H, config: EngineIoConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler,
            sessions: DashMap::new(),
        })
    }

    /// Creates and registers a new session. Does not start its heartbeat
    /// task; callers are expected to do that right after (so the handshake
    /// response can be built first).
    pub fn create_session(
        self: &Arc<Self>,
        transport: TransportType,
        req_parts: http::request::Parts,
    ) -> Arc<Socket<H::Data>> {
        let sid = Sid::new();
        let socket = Arc::new(Socket::new(
            sid,
            transport,
            req_parts,
            self.config.max_buffer_size,
        ));
        self.sessions.insert(sid, socket.clone());
        tracing::debug!("[sid={sid}] new session ({transport})");
        socket
    }

    pub fn get_socket(&self, sid: Sid) -> Option<Arc<Socket<H::Data>>> {
        self.sessions.get(&sid).map(|e| e.value().clone())
    }

    /// Tears down a single session: marks it closed, notifies the handler,
    /// and removes it from the registry.
    pub fn close_session(self: &Arc<Self>, sid: Sid, reason: DisconnectReason) {
        if let Some((_, socket)) = self.sessions.remove(&sid) {
            socket.close(reason);
            self.handler.on_disconnect(socket, reason);
        }
    }

    /// Closes every live session, for server shutdown.
    pub async fn close(self: &Arc<Self>) {
        let sids: Vec<Sid> = self.sessions.iter().map(|e| *e.key()).collect();
        for sid in sids {
            self.close_session(sid, DisconnectReason::ClosingServer);
        }
    }
}
