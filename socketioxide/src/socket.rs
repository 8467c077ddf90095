//! A socket bound to one namespace on one connection (spec §3 "Socket",
//! §4.6). Several `Socket`s can share a single engine.io connection, one per
//! namespace the client has joined (spec §4.5 multiplexing).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use engineioxide::Sid;
use std::sync::Mutex;

use crate::ack::{wait_for_ack, AckTable};
use crate::adapter::{Adapter, Room, RoomParam};
use crate::client::SocketData;
use crate::errors::{AckError, DisconnectError, SendError};
use crate::handler::{
    AckSender, BoxedDisconnectHandler, BoxedErrorHandler, BoxedEventHandler, DisconnectHandler,
    ErrorHandler, EventHandler,
};
use crate::ns::Namespace;
use crate::operators::Operators;
use crate::packet::{Codec, Packet, PacketData};
use crate::value::Value;

/// Why a [`Socket`] left its namespace (spec §7 classes 3/4, extended with
/// the application-level disconnect reasons real socket.io clients expose).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent an explicit `DISCONNECT` packet for this namespace.
    ClientNamespaceDisconnect,
    /// [`Socket::disconnect`] was called.
    ServerNamespaceDisconnect,
    /// The underlying engine.io transport closed gracefully.
    TransportClose,
    /// The underlying engine.io transport failed.
    TransportError,
    /// No `PONG` arrived in time; the engine.io session was torn down.
    HeartbeatTimeout,
    /// The server is shutting down.
    ClosingServer,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use DisconnectReason::*;
        let s = match self {
            ClientNamespaceDisconnect => "client sent a DISCONNECT packet",
            ServerNamespaceDisconnect => "the server disconnected this socket",
            TransportClose => "the transport closed gracefully",
            TransportError => "the transport failed",
            HeartbeatTimeout => "the connection's heartbeat timed out",
            ClosingServer => "the server is shutting down",
        };
        f.write_str(s)
    }
}

impl From<engineioxide::DisconnectReason> for DisconnectReason {
    fn from(reason: engineioxide::DisconnectReason) -> Self {
        use engineioxide::DisconnectReason as E;
        match reason {
            E::TransportClose => DisconnectReason::TransportClose,
            E::TransportError | E::MultipleHttpPollingError | E::PacketParsingError => {
                DisconnectReason::TransportError
            }
            E::HeartbeatTimeout => DisconnectReason::HeartbeatTimeout,
            E::ClosingServer => DisconnectReason::ClosingServer,
        }
    }
}

/// A socket bound to one namespace (spec §4.6). Cheap to clone via `Arc`;
/// handlers are always handed an `Arc<Socket<A>>`.
pub struct Socket<A: Adapter> {
    pub id: Sid,
    ns: Arc<Namespace<A>>,
    esocket: Arc<engineioxide::Socket<SocketData<A>>>,
    connected: AtomicBool,
    ack_table: AckTable,
    event_handlers: RwLock<HashMap<String, Vec<BoxedEventHandler<A>>>>,
    disconnect_handler: Mutex<Option<BoxedDisconnectHandler<A>>>,
    error_handler: Mutex<Option<BoxedErrorHandler<A>>>,
}

impl<A: Adapter> Socket<A> {
    pub(crate) fn new(
        id: Sid,
        ns: Arc<Namespace<A>>,
        esocket: Arc<engineioxide::Socket<SocketData<A>>>,
    ) -> Self {
        Self {
            id,
            ns,
            esocket,
            connected: AtomicBool::new(true),
            ack_table: AckTable::default(),
            event_handlers: RwLock::new(HashMap::new()),
            disconnect_handler: Mutex::new(None),
            error_handler: Mutex::new(None),
        }
    }

    pub fn ns(&self) -> &str {
        self.ns.path()
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Registers a handler for `event`. A second registration for the same
    /// event name runs alongside the first rather than replacing it; only
    /// the first handler's [`AckSender`] is live (spec §9 Open Question:
    /// "what happens if the application registers a second handler for the
    /// same event name").
    pub fn on(&self, event: impl Into<String>, handler: impl EventHandler<A>) {
        self.event_handlers
            .write()
            .unwrap()
            .entry(event.into())
            .or_default()
            .push(Box::new(handler));
    }

    pub fn on_disconnect(&self, handler: impl DisconnectHandler<A>) {
        *self.disconnect_handler.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn on_error(&self, handler: impl ErrorHandler<A>) {
        *self.error_handler.lock().unwrap() = Some(Box::new(handler));
    }

    /// Joins this socket to every room in `rooms` (spec §4.6 `Join`).
    pub fn join(&self, rooms: impl RoomParam) {
        self.ns.adapter().add_all(self.id, rooms.into_rooms());
    }

    /// Removes this socket from a single room (spec §4.6 `Leave`).
    pub fn leave(&self, room: Room) {
        self.ns.adapter().del(self.id, &room);
    }

    /// Removes this socket from every room it belongs to.
    pub fn leave_all(&self) {
        self.ns.adapter().del_all(self.id);
    }

    /// The rooms this socket currently belongs to.
    pub fn rooms(&self) -> Vec<Room> {
        self.ns.adapter().socket_rooms(self.id)
    }

    /// Starts a broadcast scoped to `rooms`, excluding this socket by
    /// default (spec §4.6 `To`).
    pub fn to(self: &Arc<Self>, rooms: impl RoomParam) -> Operators<A> {
        Operators::new(self.ns.clone(), Some(self.id)).to(rooms)
    }

    /// Starts a broadcast scoped to every socket except those in `rooms`.
    pub fn except(self: &Arc<Self>, rooms: impl RoomParam) -> Operators<A> {
        Operators::new(self.ns.clone(), Some(self.id)).except(rooms)
    }

    /// Starts an unscoped broadcast to the whole namespace, excluding this
    /// socket (spec §4.7 `BroadcastTo`).
    pub fn broadcast(self: &Arc<Self>) -> Operators<A> {
        Operators::new(self.ns.clone(), Some(self.id))
    }

    /// Sends `event` with `data` to this socket alone (spec §4.6 `Emit`).
    pub fn emit(&self, event: &str, data: Value) -> Result<(), SendError> {
        let packet = self.build_event_packet(event, data, None);
        self.send(packet)
    }

    /// Sends `event` and waits up to `self.ns`'s configured `ack_timeout`
    /// for the peer's reply (spec §4.6 `EmitWithAck`).
    pub async fn emit_with_ack(&self, event: &str, data: Value) -> Result<Value, AckError> {
        self.emit_with_ack_timeout(event, data, self.ns.config().ack_timeout)
            .await
    }

    pub async fn emit_with_ack_timeout(
        &self,
        event: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Value, AckError> {
        let (id, rx) = self.register_ack();
        let packet = self.build_event_packet(event, data, Some(id));
        self.send(packet)?;
        wait_for_ack(rx, timeout).await
    }

    fn build_event_packet(&self, event: &str, data: Value, id: Option<i64>) -> Packet {
        let mut items = vec![Value::String(event.to_string())];
        match data {
            Value::Array(mut rest) => items.append(&mut rest),
            other => items.push(other),
        }
        Packet::event(self.ns.path().to_string(), Value::Array(items), id)
    }

    pub(crate) fn register_ack(&self) -> (i64, tokio::sync::oneshot::Receiver<Value>) {
        self.ack_table.register()
    }

    /// Replies to a received `EVENT`'s ack `id` (spec §4.6 "invoking the
    /// callback enqueues an ACK packet").
    pub(crate) fn send_ack(&self, id: i64, data: Value, binary: Vec<Bytes>) -> Result<(), SendError> {
        let data = if binary.is_empty() {
            data
        } else {
            append_binary(data, binary)
        };
        self.send(Packet::ack(self.ns.path().to_string(), data, id))
    }

    /// Enqueues `packet` for delivery over the shared engine.io connection,
    /// encoded with whatever codec this server was configured with (spec
    /// §4.1/§4.2).
    pub(crate) fn send(&self, packet: Packet) -> Result<(), SendError> {
        match self.ns.config().codec {
            Codec::Default => {
                let (header, attachments) = packet.encode();
                self.esocket
                    .emit(engineioxide::packet::Packet::Message(
                        engineioxide::packet::MessageBody::Text(header),
                    ))
                    .map_err(SendError::from)?;
                for attachment in attachments {
                    self.esocket
                        .emit_binary(attachment.to_vec())
                        .map_err(SendError::from)?;
                }
                Ok(())
            }
            #[cfg(feature = "msgpack")]
            Codec::Msgpack => {
                let bytes = crate::packet::msgpack::encode(&packet)?;
                self.esocket
                    .emit_binary(bytes.to_vec())
                    .map_err(SendError::from)
            }
        }
    }

    /// Tears this socket's namespace binding down: sends a `DISCONNECT`
    /// packet, fails every pending ack, leaves every room, and fires the
    /// disconnect handler (spec §4.6 `Disconnect`).
    pub fn disconnect(self: Arc<Self>) -> Result<(), DisconnectError> {
        self.do_disconnect(DisconnectReason::ServerNamespaceDisconnect, true)
    }

    pub(crate) fn close(self: Arc<Self>, reason: DisconnectReason) {
        let notify_peer = !matches!(
            reason,
            DisconnectReason::TransportClose
                | DisconnectReason::TransportError
                | DisconnectReason::HeartbeatTimeout
        );
        let _ = self.do_disconnect(reason, notify_peer);
    }

    fn do_disconnect(
        self: Arc<Self>,
        reason: DisconnectReason,
        notify_peer: bool,
    ) -> Result<(), DisconnectError> {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.leave_all();
        self.ack_table.cancel_all();
        if notify_peer {
            self.send(Packet::disconnect(self.ns.path().to_string()))?;
        }
        if let Some(handler) = self.disconnect_handler.lock().unwrap().take() {
            handler.call(self.clone(), reason);
        }
        self.ns.remove_socket(self.id);
        Ok(())
    }

    /// Dispatches a decoded, namespace-routed packet to this socket's
    /// handlers (spec §4.6).
    pub(crate) fn recv(self: Arc<Self>, inner: PacketData) {
        match inner {
            PacketData::Event(data, id) => self.recv_event(data, id),
            PacketData::Ack(data, id) => {
                if !self.ack_table.resolve(id, data) {
                    self.clone()
                        .report_error(crate::errors::Error::UnknownAck(id));
                }
            }
            PacketData::Disconnect => {
                self.close(DisconnectReason::ClientNamespaceDisconnect);
            }
            other => {
                tracing::debug!(
                    "[sid={}] unexpected packet reached socket::recv (binary packets must be \
                     materialized by the caller first): {other:?}",
                    self.id
                );
            }
        }
    }

    fn recv_event(self: Arc<Self>, data: Value, id: Option<i64>) {
        let (event, args) = match data {
            Value::Array(mut items) if !items.is_empty() => {
                let event = match items.remove(0) {
                    Value::String(s) => s,
                    _ => return,
                };
                (event, Value::Array(items))
            }
            _ => return,
        };
        let handlers = self.event_handlers.read().unwrap();
        let Some(handlers) = handlers.get(&event) else {
            return;
        };
        let sent = Arc::new(AtomicBool::new(false));
        for (i, handler) in handlers.iter().enumerate() {
            let ack = id.map(|id| AckSender::new(self.clone(), id, i == 0, sent.clone()));
            handler.call(self.clone(), args.clone(), ack);
        }
    }

    pub(crate) fn report_error(self: &Arc<Self>, error: crate::errors::Error) {
        if let Some(handler) = self.error_handler.lock().unwrap().as_ref() {
            handler.call(self.clone(), error);
        } else {
            tracing::debug!("[sid={}] unhandled socket error: {error}", self.id);
        }
    }
}

fn append_binary(data: Value, binary: Vec<Bytes>) -> Value {
    let mut items = match data {
        Value::Array(items) => items,
        other => vec![other],
    };
    items.extend(binary.into_iter().map(Value::Blob));
    Value::Array(items)
}
