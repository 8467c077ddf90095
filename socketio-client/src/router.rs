//! Routes engine.io traffic arriving on the client's one connection to the
//! namespace-scoped [`Socket`]s multiplexed over it — the client-side
//! mirror of `socketioxide::client::Client`, simplified to a single
//! connection instead of a registry of many.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use engineioxide::Sid;
use socketioxide::packet::{BinaryPacket, Codec, Packet, PacketData};
use socketioxide::Value;

use crate::engine::{DisconnectReason as EngineDisconnectReason, EngineClientHandler, EngineSocket};
use crate::socket::{DisconnectReason, Socket};

/// Owns every namespace socket active on this client's connection and
/// dispatches decoded packets to the namespace they're addressed to (the
/// client counterpart of `socketioxide::client::Client::route`).
pub struct ClientRouter {
    codec: Codec,
    ack_timeout: Duration,
    engine: Mutex<Option<Weak<EngineSocket<ClientRouter>>>>,
    namespaces: DashMap<String, Arc<Socket>>,
    partial_bin_packet: Mutex<Option<Packet>>,
}

impl ClientRouter {
    pub(crate) fn new(codec: Codec, ack_timeout: Duration) -> Self {
        Self {
            codec,
            ack_timeout,
            engine: Mutex::new(None),
            namespaces: DashMap::new(),
            partial_bin_packet: Mutex::new(None),
        }
    }

    /// Creates (or returns) the socket bound to `path` and, if the
    /// connection is already open, sends its `CONNECT` request
    /// immediately. If the connection is still handshaking, the request is
    /// sent once [`EngineClientHandler::on_open`] fires.
    pub(crate) fn of(self: &Arc<Self>, path: &str) -> Arc<Socket> {
        if let Some(existing) = self.namespaces.get(path) {
            return existing.value().clone();
        }
        let engine = self.engine.lock().unwrap().clone().unwrap_or_default();
        let socket = Arc::new(Socket::new(path.to_string(), engine, self.codec, self.ack_timeout));
        self.namespaces.insert(path.to_string(), socket.clone());
        if self.engine.lock().unwrap().is_some() {
            self.send_connect_request(path);
        }
        socket
    }

    fn send_connect_request(&self, path: &str) {
        let packet = Packet {
            ns: path.to_string(),
            inner: PacketData::Connect(None),
        };
        let _ = self.send_engine_packet(packet);
    }

    fn send_engine_packet(&self, packet: Packet) -> Result<(), crate::errors::Error> {
        let Some(engine) = self
            .engine
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
        else {
            return Err(crate::errors::Error::Closed);
        };
        match self.codec {
            Codec::Default => {
                let (header, attachments) = packet.encode();
                engine.emit_text(header)?;
                for attachment in attachments {
                    engine.emit_binary(attachment.to_vec())?;
                }
                Ok(())
            }
            #[cfg(feature = "msgpack")]
            Codec::Msgpack => {
                let bytes = socketioxide::packet::msgpack::encode(&packet)
                    .map_err(socketioxide::errors::SendError::from)?;
                engine.emit_binary(bytes.to_vec())?;
                Ok(())
            }
        }
    }

    fn route(&self, packet: Packet) {
        let Packet { ns: ns_path, inner } = packet;
        match inner {
            PacketData::Connect(payload) => self.handle_connect_ack(&ns_path, payload),
            PacketData::ConnectError(message) => self.handle_connect_error(&ns_path, message),
            PacketData::Disconnect => {
                if let Some(socket) = self.namespaces.get(&ns_path).map(|e| e.value().clone()) {
                    socket.recv(PacketData::Disconnect);
                }
            }
            other => {
                let Some(socket) = self.namespaces.get(&ns_path).map(|e| e.value().clone()) else {
                    tracing::debug!(
                        "packet for namespace {ns_path} with no active socket: {other:?}"
                    );
                    return;
                };
                socket.recv(other);
            }
        }
    }

    fn handle_connect_ack(&self, ns_path: &str, payload: Option<Value>) {
        let Some(socket) = self.namespaces.get(ns_path).map(|e| e.value().clone()) else {
            return;
        };
        let sid = payload.as_ref().and_then(extract_sid).unwrap_or_default();
        socket.mark_connected(sid);
    }

    fn handle_connect_error(&self, ns_path: &str, message: String) {
        if let Some(socket) = self.namespaces.get(ns_path).map(|e| e.value().clone()) {
            socket.report_error(crate::errors::Error::ConnectRejected(
                ns_path.to_string(),
                message,
            ));
        }
        self.namespaces.remove(ns_path);
    }

    /// Tears every namespace socket down when the underlying connection is
    /// lost, mirroring `socketioxide::client::Client::disconnect_all`.
    fn disconnect_all(&self, reason: DisconnectReason) {
        for entry in self.namespaces.iter() {
            entry.value().clone().close(reason, false);
        }
    }

    /// Re-sends `CONNECT` for every namespace the caller previously
    /// requested, so a reconnect transparently rejoins them (a real
    /// socket.io client auto-rejoins namespaces after a reconnect).
    fn rejoin_all(&self) {
        let paths: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        for path in paths {
            self.send_connect_request(&path);
        }
    }
}

fn extract_sid(value: &Value) -> Option<Sid> {
    match value {
        Value::Object(fields) => fields
            .iter()
            .find(|(k, _)| k == "sid")
            .and_then(|(_, v)| v.as_str())
            .and_then(|s| s.parse().ok()),
        _ => None,
    }
}

impl EngineClientHandler for ClientRouter {
    fn on_open(&self, engine: &Arc<EngineSocket<Self>>, _sid: Sid) {
        *self.engine.lock().unwrap() = Some(Arc::downgrade(engine));
        self.rejoin_all();
    }

    fn on_message(&self, _engine: &Arc<EngineSocket<Self>>, text: String) {
        let packet = match Packet::decode_header(&text) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::debug!("malformed packet header: {err}");
                return;
            }
        };
        if needs_attachments(&packet) {
            *self.partial_bin_packet.lock().unwrap() = Some(packet);
        } else {
            self.route(packet);
        }
    }

    fn on_binary(&self, _engine: &Arc<EngineSocket<Self>>, data: Vec<u8>) {
        let mut pending = self.partial_bin_packet.lock().unwrap();
        match pending.take() {
            Some(mut packet) => {
                add_payload(&mut packet.inner, data);
                if is_complete(&packet.inner) {
                    drop(pending);
                    match packet.materialize() {
                        Ok(packet) => self.route(packet),
                        Err(err) => tracing::debug!("failed to materialize binary packet: {err}"),
                    }
                } else {
                    *pending = Some(packet);
                }
            }
            None => {
                drop(pending);
                #[cfg(feature = "msgpack")]
                if self.codec == Codec::Msgpack {
                    match socketioxide::packet::msgpack::decode(&data) {
                        Ok(packet) => self.route(packet),
                        Err(err) => tracing::debug!("malformed msgpack packet: {err}"),
                    }
                    return;
                }
                tracing::debug!("unexpected binary frame with no pending packet");
            }
        }
    }

    fn on_close(&self, _engine: &Arc<EngineSocket<Self>>, reason: EngineDisconnectReason) {
        let reason = match reason {
            EngineDisconnectReason::ClientDisconnect => DisconnectReason::ClientNamespaceDisconnect,
            EngineDisconnectReason::TransportClose => DisconnectReason::TransportClose,
            EngineDisconnectReason::TransportError => DisconnectReason::TransportError,
        };
        self.disconnect_all(reason);
    }
}

fn needs_attachments(packet: &Packet) -> bool {
    match &packet.inner {
        PacketData::BinaryEvent(bin, _) | PacketData::BinaryAck(bin, _) => !bin.is_complete(),
        _ => false,
    }
}

fn is_complete(inner: &PacketData) -> bool {
    match inner {
        PacketData::BinaryEvent(bin, _) | PacketData::BinaryAck(bin, _) => bin.is_complete(),
        _ => true,
    }
}

fn add_payload(inner: &mut PacketData, data: Vec<u8>) {
    let bin: &mut BinaryPacket = match inner {
        PacketData::BinaryEvent(bin, _) | PacketData::BinaryAck(bin, _) => bin,
        _ => return,
    };
    bin.add_payload(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn router() -> Arc<ClientRouter> {
        Arc::new(ClientRouter::new(Codec::Default, Duration::from_secs(5)))
    }

    #[test]
    fn extract_sid_reads_the_sid_field_off_a_connect_payload() {
        let payload = Value::Object(vec![("sid".into(), Value::String("abc".into()))]);
        assert!(extract_sid(&payload).is_none()); // "abc" isn't a valid 20-byte sid

        let sid = Sid::new();
        let payload = Value::Object(vec![("sid".into(), Value::String(sid.to_string()))]);
        assert_eq!(extract_sid(&payload), Some(sid));
    }

    #[test]
    fn of_returns_the_same_socket_for_a_repeated_path() {
        let router = router();
        let a = router.of("/chat");
        let b = router.of("/chat");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn of_creates_distinct_sockets_per_namespace() {
        let router = router();
        let a = router.of("/chat");
        let b = router.of("/admin");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn connect_ack_marks_the_matching_socket_connected() {
        let router = router();
        let socket = router.of("/chat");
        assert!(!socket.connected());

        let sid = Sid::new();
        let payload = Value::Object(vec![("sid".into(), Value::String(sid.to_string()))]);
        router.handle_connect_ack("/chat", Some(payload));

        assert!(socket.connected());
        assert_eq!(socket.id(), Some(sid));
    }

    #[test]
    fn connect_error_drops_the_namespace() {
        let router = router();
        let socket = router.of("/chat");
        router.handle_connect_error("/chat", "not authorized".to_string());
        // a fresh `of()` call must mint a new socket, not return the rejected one
        let again = router.of("/chat");
        assert!(!Arc::ptr_eq(&socket, &again));
    }

    #[test]
    fn needs_attachments_is_false_for_plain_events() {
        let packet = Packet {
            ns: "/".to_string(),
            inner: PacketData::Event(Value::Null, None),
        };
        assert!(!needs_attachments(&packet));
    }
}
