//! A client-side socket bound to one namespace (the client counterpart of
//! `socketioxide::socket::Socket`): event dispatch, acks, and the
//! connect/disconnect lifecycle, minus rooms (the GLOSSARY scopes rooms to
//! the server).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use bytes::Bytes;
use engineioxide::Sid;
use socketioxide::ack::{wait_for_ack, AckTable};
use socketioxide::errors::{AckError, SendError};
use socketioxide::packet::{Codec, Packet, PacketData};
use socketioxide::Value;

use crate::engine::EngineSocket;
use crate::handler::{
    AckSender, BoxedConnectHandler, BoxedDisconnectHandler, BoxedErrorHandler, BoxedEventHandler,
    ConnectHandler, DisconnectHandler, ErrorHandler, EventHandler,
};
use crate::router::ClientRouter;

/// Why a client [`Socket`] left its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent an explicit `DISCONNECT` packet for this namespace.
    ServerNamespaceDisconnect,
    /// [`Socket::disconnect`] was called.
    ClientNamespaceDisconnect,
    /// The underlying engine.io connection closed gracefully.
    TransportClose,
    /// The underlying engine.io connection failed.
    TransportError,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use DisconnectReason::*;
        let s = match self {
            ServerNamespaceDisconnect => "the server disconnected this namespace",
            ClientNamespaceDisconnect => "the client disconnected this namespace",
            TransportClose => "the transport closed gracefully",
            TransportError => "the transport failed",
        };
        f.write_str(s)
    }
}

/// A socket bound to one namespace on a client connection. Cheap to clone
/// via `Arc`; handlers are always handed an `Arc<Socket>`.
pub struct Socket {
    ns: String,
    id: Mutex<Option<Sid>>,
    engine: Weak<EngineSocket<ClientRouter>>,
    codec: Codec,
    connected: AtomicBool,
    ack_table: AckTable,
    ack_timeout: Duration,
    event_handlers: RwLock<HashMap<String, Vec<BoxedEventHandler>>>,
    connect_handler: Mutex<Option<BoxedConnectHandler>>,
    disconnect_handler: Mutex<Option<BoxedDisconnectHandler>>,
    error_handler: Mutex<Option<BoxedErrorHandler>>,
}

impl Socket {
    pub(crate) fn new(
        ns: String,
        engine: Weak<EngineSocket<ClientRouter>>,
        codec: Codec,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            ns,
            id: Mutex::new(None),
            engine,
            codec,
            connected: AtomicBool::new(false),
            ack_table: AckTable::default(),
            ack_timeout,
            event_handlers: RwLock::new(HashMap::new()),
            connect_handler: Mutex::new(None),
            disconnect_handler: Mutex::new(None),
            error_handler: Mutex::new(None),
        }
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// The socket id the server minted for this namespace binding once
    /// `CONNECT` completes. `None` until then.
    pub fn id(&self) -> Option<Sid> {
        *self.id.lock().unwrap()
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn mark_connected(self: &Arc<Self>, id: Sid) {
        *self.id.lock().unwrap() = Some(id);
        self.connected.store(true, Ordering::Release);
        if let Some(handler) = self.connect_handler.lock().unwrap().as_ref() {
            handler.call(self.clone());
        }
    }

    /// Fires once after this namespace's `CONNECT` handshake completes. If
    /// the socket is already connected when this is registered, it fires
    /// immediately.
    pub fn on_connect(self: &Arc<Self>, handler: impl ConnectHandler) {
        let handler: BoxedConnectHandler = Box::new(handler);
        if self.connected() {
            handler.call(self.clone());
        }
        *self.connect_handler.lock().unwrap() = Some(handler);
    }

    /// Registers a handler for `event`. A second registration for the same
    /// event name runs alongside the first, same as the server socket.
    pub fn on(&self, event: impl Into<String>, handler: impl EventHandler) {
        self.event_handlers
            .write()
            .unwrap()
            .entry(event.into())
            .or_default()
            .push(Box::new(handler));
    }

    pub fn on_disconnect(&self, handler: impl DisconnectHandler) {
        *self.disconnect_handler.lock().unwrap() = Some(Box::new(handler));
    }

    pub fn on_error(&self, handler: impl ErrorHandler) {
        *self.error_handler.lock().unwrap() = Some(Box::new(handler));
    }

    /// Sends `event` with `data` to the server on this namespace.
    pub fn emit(&self, event: &str, data: Value) -> Result<(), SendError> {
        let packet = self.build_event_packet(event, data, None);
        self.send(packet)
    }

    /// Sends `event` and waits up to this socket's configured ack timeout
    /// for the server's reply.
    pub async fn emit_with_ack(&self, event: &str, data: Value) -> Result<Value, AckError> {
        self.emit_with_ack_timeout(event, data, self.ack_timeout).await
    }

    pub async fn emit_with_ack_timeout(
        &self,
        event: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Value, AckError> {
        let (id, rx) = self.ack_table.register();
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
        Packet::event(self.ns.clone(), Value::Array(items), id)
    }

    pub(crate) fn send_ack(&self, id: i64, data: Value, binary: Vec<Bytes>) -> Result<(), SendError> {
        let data = if binary.is_empty() {
            data
        } else {
            append_binary(data, binary)
        };
        self.send(Packet::ack(self.ns.clone(), data, id))
    }

    pub(crate) fn send(&self, packet: Packet) -> Result<(), SendError> {
        let Some(engine) = self.engine.upgrade() else {
            return Err(SendError::Closed);
        };
        match self.codec {
            Codec::Default => {
                let (header, attachments) = packet.encode();
                engine.emit_text(header).map_err(|_| SendError::Closed)?;
                for attachment in attachments {
                    engine
                        .emit_binary(attachment.to_vec())
                        .map_err(|_| SendError::Closed)?;
                }
                Ok(())
            }
            #[cfg(feature = "msgpack")]
            Codec::Msgpack => {
                let bytes = socketioxide::packet::msgpack::encode(&packet)?;
                engine.emit_binary(bytes.to_vec()).map_err(|_| SendError::Closed)
            }
        }
    }

    /// Sends a `DISCONNECT` for this namespace and tears the binding down
    /// locally; the underlying engine.io connection (and any other
    /// namespace bound to it) is unaffected.
    pub fn disconnect(self: Arc<Self>) {
        self.close(DisconnectReason::ClientNamespaceDisconnect, true);
    }

    pub(crate) fn close(self: Arc<Self>, reason: DisconnectReason, notify_peer: bool) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        self.ack_table.cancel_all();
        if notify_peer {
            let _ = self.send(Packet::disconnect(self.ns.clone()));
        }
        if let Some(handler) = self.disconnect_handler.lock().unwrap().take() {
            handler.call(self.clone(), reason);
        }
    }

    /// Dispatches a decoded, namespace-routed packet to this socket's
    /// handlers.
    pub(crate) fn recv(self: Arc<Self>, inner: PacketData) {
        match inner {
            PacketData::Event(data, id) => self.recv_event(data, id),
            PacketData::Ack(data, id) => {
                if !self.ack_table.resolve(id, data) {
                    self.clone().report_error(crate::errors::Error::UnknownAck(id));
                }
            }
            PacketData::Disconnect => {
                self.close(DisconnectReason::ServerNamespaceDisconnect, false);
            }
            other => {
                tracing::debug!(
                    "[ns={}] unexpected packet reached socket::recv: {other:?}",
                    self.ns
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
            tracing::debug!("[ns={}] unhandled socket error: {error}", self.ns);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_socket() -> Arc<Socket> {
        Arc::new(Socket::new(
            "/".to_string(),
            Weak::new(),
            Codec::Default,
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn build_event_packet_puts_the_event_name_first() {
        let socket = dummy_socket();
        let packet = socket.build_event_packet("greet", Value::String("hi".into()), None);
        match packet.inner {
            PacketData::Event(Value::Array(items), None) => {
                assert_eq!(items[0], Value::String("greet".into()));
                assert_eq!(items[1], Value::String("hi".into()));
            }
            other => panic!("unexpected packet data: {other:?}"),
        }
    }

    #[test]
    fn build_event_packet_splices_array_payloads() {
        let socket = dummy_socket();
        let data = Value::Array(vec![
            Value::Number(1.into()),
            Value::Number(2.into()),
        ]);
        let packet = socket.build_event_packet("nums", data, Some(7));
        match packet.inner {
            PacketData::Event(Value::Array(items), Some(7)) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0], Value::String("nums".into()));
            }
            other => panic!("unexpected packet data: {other:?}"),
        }
    }

    #[test]
    fn sending_without_a_live_engine_fails_closed() {
        let socket = dummy_socket();
        let err = socket.emit("hello", Value::Null).unwrap_err();
        assert!(matches!(err, SendError::Closed));
    }

    #[test]
    fn on_connect_fires_immediately_if_already_connected() {
        let socket = dummy_socket();
        socket.mark_connected(Sid::new());
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        socket.on_connect(move |_s: Arc<Socket>| {
            fired2.store(true, Ordering::SeqCst);
        });
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let socket = dummy_socket();
        socket.mark_connected(Sid::new());
        assert!(socket.connected());
        socket.clone().close(DisconnectReason::TransportClose, false);
        assert!(!socket.connected());
        // a second close must not panic or double-fire the disconnect handler
        socket.clone().close(DisconnectReason::TransportClose, false);
    }

    #[test]
    fn unknown_ack_id_is_reported_as_an_error() {
        let socket = dummy_socket();
        let reported = Arc::new(AtomicBool::new(false));
        let reported2 = reported.clone();
        socket.on_error(move |_s: Arc<Socket>, _err: crate::errors::Error| {
            reported2.store(true, Ordering::SeqCst);
        });
        socket.clone().recv(PacketData::Ack(Value::Null, 42));
        assert!(reported.load(Ordering::SeqCst));
    }
}
