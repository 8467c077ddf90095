//! A namespace: a named, independently-addressed channel multiplexed over
//! shared engine.io connections (spec §3 "Namespace", §4.5).

use std::sync::Arc;

use dashmap::DashMap;
use engineioxide::Sid;

use crate::adapter::Adapter;
use crate::client::SocketData;
use crate::config::SocketIoConfig;
use crate::handler::{BoxedConnectHandler, ConnectHandler};
use crate::operators::Operators;
use crate::packet::Packet;
use crate::socket::{DisconnectReason, Socket};

/// One namespace's sockets and room bookkeeping (spec §4.5). A namespace is
/// created the first time a path is registered with
/// [`crate::SocketIo::ns`] and lives for the server's lifetime.
pub struct Namespace<A: Adapter> {
    path: String,
    config: Arc<SocketIoConfig>,
    adapter: A,
    connect_handler: BoxedConnectHandler<A>,
    sockets: DashMap<Sid, Arc<Socket<A>>>,
}

impl<A: Adapter> Namespace<A> {
    pub(crate) fn new(
        path: impl Into<String>,
        config: Arc<SocketIoConfig>,
        connect_handler: impl ConnectHandler<A>,
    ) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            config,
            adapter: A::new(),
            connect_handler: Box::new(connect_handler),
            sockets: DashMap::new(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn config(&self) -> &SocketIoConfig {
        &self.config
    }

    pub fn get_socket(&self, sid: Sid) -> Option<Arc<Socket<A>>> {
        self.sockets.get(&sid).map(|e| e.value().clone())
    }

    pub fn sockets(&self) -> Vec<Arc<Socket<A>>> {
        self.sockets.iter().map(|e| e.value().clone()).collect()
    }

    /// Starts a broadcast targeting the whole namespace (spec §4.7
    /// `BroadcastTo`).
    pub fn to(self: &Arc<Self>, rooms: impl crate::adapter::RoomParam) -> Operators<A> {
        Operators::new(self.clone(), None).to(rooms)
    }

    pub(crate) fn remove_socket(&self, sid: Sid) {
        self.sockets.remove(&sid);
        self.adapter.del_all(sid);
    }

    /// Admits a new socket: mints it a fresh id (distinct from the shared
    /// engine.io connection's `sid`), registers it, and fires the
    /// namespace's connect handler (spec §4.5, §4.6 `OnConnect`).
    pub(crate) fn connect(
        self: &Arc<Self>,
        esocket: Arc<engineioxide::Socket<SocketData<A>>>,
    ) -> Arc<Socket<A>> {
        let sid = Sid::new();
        let socket = Arc::new(Socket::new(sid, self.clone(), esocket));
        self.sockets.insert(sid, socket.clone());
        // Every socket is implicitly a member of a room named after its own
        // id, so a rooms-less broadcast (`Socket::broadcast`/`Namespace::to`
        // with no `to(...)`) reaches every connected socket, not just those
        // that joined an explicit room.
        self.adapter.add_all(sid, vec![sid.to_string()]);
        self.connect_handler.call(socket.clone());
        socket
    }

    pub(crate) fn close_socket(&self, sid: Sid, reason: DisconnectReason) {
        if let Some(socket) = self.get_socket(sid) {
            socket.close(reason);
        }
    }

    /// Tears down every socket in this namespace, for server shutdown.
    pub(crate) fn close(&self) {
        let sids: Vec<Sid> = self.sockets.iter().map(|e| *e.key()).collect();
        for sid in sids {
            self.close_socket(sid, DisconnectReason::ClosingServer);
        }
    }

    /// Builds the `CONNECT` reply packet for a freshly admitted socket.
    pub(crate) fn connect_packet(&self, sid: Sid) -> Packet {
        Packet::connect(self.path.clone(), sid)
    }

    pub(crate) fn invalid_namespace_packet(path: &str) -> Packet {
        Packet::invalid_namespace(path.to_string())
    }
}
