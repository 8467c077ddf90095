//! The callback surface a namespace/socket exposes (spec §4.6): `OnConnect`,
//! `OnDisconnect`, `OnError`, `OnEvent`, and the acknowledgement sender
//! handed to an event handler when the peer's `EVENT` carried an `id`.
//!
//! Handlers receive the decoded `data[1..]` payload and binary attachments
//! as a plain [`Value`]/`Vec<Bytes>` pair rather than through a typed
//! extractor system (spec §9 design note, option (a): "a handler
//! trait/interface that receives the decoded structured-value list and
//! pulls arguments positionally").

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::adapter::Adapter;
use crate::errors::SendError;
use crate::socket::{DisconnectReason, Socket};
use crate::value::Value;

/// The reply channel handed to an event handler whose `EVENT` carried an
/// ack `id` (spec §4.6: "invoking the callback enqueues an ACK packet").
///
/// Per spec §9's resolution of the multi-handler Open Question, only the
/// first handler registered for an event gets a *live* sender; every
/// subsequent handler for the same event gets one whose [`AckSender::send`]
/// is a no-op, so multiple handlers can still run for side effects without
/// racing to produce the single ACK the protocol allows.
pub struct AckSender<A: Adapter> {
    socket: Arc<Socket<A>>,
    id: i64,
    live: bool,
    sent: Arc<AtomicBool>,
}

impl<A: Adapter> AckSender<A> {
    pub(crate) fn new(socket: Arc<Socket<A>>, id: i64, live: bool, sent: Arc<AtomicBool>) -> Self {
        Self {
            socket,
            id,
            live,
            sent,
        }
    }

    /// Sends the ACK with `data` as its payload. A no-op if this sender is
    /// inert (not the first handler) or if an ack for this `id` was
    /// already sent.
    pub fn send(self, data: Value) -> Result<(), SendError> {
        if !self.live || self.sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.socket.send_ack(self.id, data, Vec::new())
    }

    /// Sends the ACK with `data` plus binary attachments, promoting it to a
    /// `BINARY_ACK` (spec §4.1 promotion rule).
    pub fn bin(self, binary: Vec<Bytes>) -> AckSenderWithBin<A> {
        AckSenderWithBin {
            inner: self,
            binary,
        }
    }
}

/// An [`AckSender`] with binary attachments staged via [`AckSender::bin`].
pub struct AckSenderWithBin<A: Adapter> {
    inner: AckSender<A>,
    binary: Vec<Bytes>,
}

impl<A: Adapter> AckSenderWithBin<A> {
    pub fn send(self, data: Value) -> Result<(), SendError> {
        if !self.inner.live || self.inner.sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.socket.send_ack(self.inner.id, data, self.binary)
    }
}

/// A handler bound to one event name on one [`Socket`] (spec §4.6 `OnEvent`).
///
/// `data` is the event's argument list (`EVENT`'s `data[1..]`) as one
/// [`Value::Array`]; any binary attachments the peer sent already sit
/// inline as [`Value::Blob`] leaves (spec §4.1) rather than arriving
/// through a side channel.
pub trait EventHandler<A: Adapter>: Send + Sync + 'static {
    fn call(&self, socket: Arc<Socket<A>>, data: Value, ack: Option<AckSender<A>>);
}

impl<A, F> EventHandler<A> for F
where
    A: Adapter,
    F: Fn(Arc<Socket<A>>, Value, Option<AckSender<A>>) + Send + Sync + 'static,
{
    fn call(&self, socket: Arc<Socket<A>>, data: Value, ack: Option<AckSender<A>>) {
        self(socket, data, ack)
    }
}

pub(crate) type BoxedEventHandler<A> = Box<dyn EventHandler<A>>;

/// Fires once after `CONNECT` is exchanged for a new socket (spec §4.6
/// `OnConnect`, registered namespace-wide via [`crate::ns::Namespace`]).
pub trait ConnectHandler<A: Adapter>: Send + Sync + 'static {
    fn call(&self, socket: Arc<Socket<A>>);
}

impl<A, F> ConnectHandler<A> for F
where
    A: Adapter,
    F: Fn(Arc<Socket<A>>) + Send + Sync + 'static,
{
    fn call(&self, socket: Arc<Socket<A>>) {
        self(socket)
    }
}

pub(crate) type BoxedConnectHandler<A> = Box<dyn ConnectHandler<A>>;

/// Fires at most once per socket, on explicit `DISCONNECT`, transport
/// death, or namespace close (spec §4.6 `OnDisconnect`).
pub trait DisconnectHandler<A: Adapter>: Send + Sync + 'static {
    fn call(&self, socket: Arc<Socket<A>>, reason: DisconnectReason);
}

impl<A, F> DisconnectHandler<A> for F
where
    A: Adapter,
    F: Fn(Arc<Socket<A>>, DisconnectReason) + Send + Sync + 'static,
{
    fn call(&self, socket: Arc<Socket<A>>, reason: DisconnectReason) {
        self(socket, reason)
    }
}

pub(crate) type BoxedDisconnectHandler<A> = Box<dyn DisconnectHandler<A>>;

/// A decode error, handler panic, or protocol violation scoped to one
/// socket (spec §4.6 `OnError`, §7 classes 1/2/5).
pub trait ErrorHandler<A: Adapter>: Send + Sync + 'static {
    fn call(&self, socket: Arc<Socket<A>>, error: crate::errors::Error);
}

impl<A, F> ErrorHandler<A> for F
where
    A: Adapter,
    F: Fn(Arc<Socket<A>>, crate::errors::Error) + Send + Sync + 'static,
{
    fn call(&self, socket: Arc<Socket<A>>, error: crate::errors::Error) {
        self(socket, error)
    }
}

pub(crate) type BoxedErrorHandler<A> = Box<dyn ErrorHandler<A>>;

impl<A: Adapter> fmt::Debug for AckSender<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckSender")
            .field("id", &self.id)
            .field("live", &self.live)
            .finish()
    }
}
