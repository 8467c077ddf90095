//! The callback surface a client-side namespace socket exposes: `OnConnect`,
//! `OnDisconnect`, `OnError`, `OnEvent`, mirroring the server's
//! `socketioxide::handler` but without rooms/adapter, since a client
//! connects to namespaces one at a time rather than hosting them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use socketioxide::errors::SendError;
use socketioxide::Value;

use crate::socket::{DisconnectReason, Socket};

/// The reply channel handed to an event handler whose `EVENT` carried an
/// ack `id`. As on the server, only the first handler registered for an
/// event gets a live sender; later handlers for the same name run for side
/// effects only (same multi-handler resolution as the server socket).
pub struct AckSender {
    socket: Arc<Socket>,
    id: i64,
    live: bool,
    sent: Arc<AtomicBool>,
}

impl AckSender {
    pub(crate) fn new(socket: Arc<Socket>, id: i64, live: bool, sent: Arc<AtomicBool>) -> Self {
        Self {
            socket,
            id,
            live,
            sent,
        }
    }

    pub fn send(self, data: Value) -> Result<(), SendError> {
        if !self.live || self.sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.socket.send_ack(self.id, data, Vec::new())
    }

    pub fn bin(self, binary: Vec<Bytes>) -> AckSenderWithBin {
        AckSenderWithBin {
            inner: self,
            binary,
        }
    }
}

pub struct AckSenderWithBin {
    inner: AckSender,
    binary: Vec<Bytes>,
}

impl AckSenderWithBin {
    pub fn send(self, data: Value) -> Result<(), SendError> {
        if !self.inner.live || self.inner.sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.socket.send_ack(self.inner.id, data, self.binary)
    }
}

/// A handler bound to one event name on one [`Socket`].
pub trait EventHandler: Send + Sync + 'static {
    fn call(&self, socket: Arc<Socket>, data: Value, ack: Option<AckSender>);
}

impl<F> EventHandler for F
where
    F: Fn(Arc<Socket>, Value, Option<AckSender>) + Send + Sync + 'static,
{
    fn call(&self, socket: Arc<Socket>, data: Value, ack: Option<AckSender>) {
        self(socket, data, ack)
    }
}

pub(crate) type BoxedEventHandler = Box<dyn EventHandler>;

/// Fires once after this socket's namespace `CONNECT` handshake completes.
pub trait ConnectHandler: Send + Sync + 'static {
    fn call(&self, socket: Arc<Socket>);
}

impl<F> ConnectHandler for F
where
    F: Fn(Arc<Socket>) + Send + Sync + 'static,
{
    fn call(&self, socket: Arc<Socket>) {
        self(socket)
    }
}

pub(crate) type BoxedConnectHandler = Box<dyn ConnectHandler>;

/// Fires at most once per socket, on explicit `DISCONNECT`, transport
/// death, or the client closing itself.
pub trait DisconnectHandler: Send + Sync + 'static {
    fn call(&self, socket: Arc<Socket>, reason: DisconnectReason);
}

impl<F> DisconnectHandler for F
where
    F: Fn(Arc<Socket>, DisconnectReason) + Send + Sync + 'static,
{
    fn call(&self, socket: Arc<Socket>, reason: DisconnectReason) {
        self(socket, reason)
    }
}

pub(crate) type BoxedDisconnectHandler = Box<dyn DisconnectHandler>;

/// A decode error, handler panic, or protocol violation scoped to one
/// socket (the client-side counterpart of `socketioxide::errors::Error`).
pub trait ErrorHandler: Send + Sync + 'static {
    fn call(&self, socket: Arc<Socket>, error: crate::errors::Error);
}

impl<F> ErrorHandler for F
where
    F: Fn(Arc<Socket>, crate::errors::Error) + Send + Sync + 'static,
{
    fn call(&self, socket: Arc<Socket>, error: crate::errors::Error) {
        self(socket, error)
    }
}

pub(crate) type BoxedErrorHandler = Box<dyn ErrorHandler>;

impl fmt::Debug for AckSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckSender")
            .field("id", &self.id)
            .field("live", &self.live)
            .finish()
    }
}
