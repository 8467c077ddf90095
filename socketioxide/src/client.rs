//! The [`engineioxide::EngineIoHandler`] implementation that turns raw
//! engine.io transport events into routed, namespace-scoped socket.io
//! packets (spec §4.5 multiplexing, §4.6).

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::adapter::Adapter;
use crate::config::SocketIoConfig;
use crate::handler::ConnectHandler;
use crate::ns::Namespace;
use crate::packet::{BinaryPacket, Codec, Packet, PacketData, PacketParseError};
use crate::socket::Socket;

/// Per-engine-connection state: which namespace sockets are multiplexed
/// over it, and the in-progress `BINARY_*` packet (if any) waiting on its
/// attachments (spec §4.1 "a header followed by that many raw binary
/// frames").
pub struct SocketData<A: Adapter> {
    namespaces: DashMap<String, Arc<Socket<A>>>,
    partial_bin_packet: Mutex<Option<Packet>>,
}

impl<A: Adapter> Default for SocketData<A> {
    fn default() -> Self {
        Self {
            namespaces: DashMap::new(),
            partial_bin_packet: Mutex::new(None),
        }
    }
}

/// Owns every namespace and dispatches packets arriving over any engine.io
/// connection to the namespace they're addressed to.
pub struct Client<A: Adapter> {
    config: Arc<SocketIoConfig>,
    namespaces: DashMap<String, Arc<Namespace<A>>>,
}

impl<A: Adapter> Client<A> {
    pub(crate) fn new(config: Arc<SocketIoConfig>) -> Self {
        Self {
            config,
            namespaces: DashMap::new(),
        }
    }

    pub(crate) fn add_ns(&self, path: impl Into<String>, connect_handler: impl ConnectHandler<A>) {
        let path = path.into();
        let ns = Namespace::new(path.clone(), self.config.clone(), connect_handler);
        self.namespaces.insert(path, ns);
    }

    pub(crate) fn get_ns(&self, path: &str) -> Option<Arc<Namespace<A>>> {
        self.namespaces.get(path).map(|e| e.value().clone())
    }

    pub(crate) fn namespaces(&self) -> Vec<Arc<Namespace<A>>> {
        self.namespaces.iter().map(|e| e.value().clone()).collect()
    }

    fn decode(&self, header: &str) -> Result<Packet, PacketParseError> {
        Packet::decode_header(header)
    }

    fn handle_connect(
        &self,
        esocket: &Arc<engineioxide::Socket<SocketData<A>>>,
        ns_path: String,
    ) {
        let Some(ns) = self.get_ns(&ns_path) else {
            tracing::debug!("[sid={}] connect to unknown namespace {ns_path}", esocket.id);
            let packet = Namespace::<A>::invalid_namespace_packet(&ns_path);
            let _ = send_engine_packet(esocket, &self.config.codec, packet);
            return;
        };
        let socket = ns.connect(esocket.clone());
        esocket.data.namespaces.insert(ns_path, socket.clone());
        let reply = ns.connect_packet(socket.id);
        if let Err(err) = send_engine_packet(esocket, &self.config.codec, reply) {
            tracing::debug!("[sid={}] failed to send CONNECT ack: {err}", esocket.id);
        }
    }

    fn handle_disconnect(&self, esocket: &Arc<engineioxide::Socket<SocketData<A>>>, ns_path: String) {
        if let Some((_, socket)) = esocket.data.namespaces.remove(&ns_path) {
            socket.recv(PacketData::Disconnect);
        }
    }

    fn route(&self, esocket: &Arc<engineioxide::Socket<SocketData<A>>>, packet: Packet) {
        let Packet { ns: ns_path, inner } = packet;
        match inner {
            PacketData::Connect(_) => self.handle_connect(esocket, ns_path),
            PacketData::Disconnect => self.handle_disconnect(esocket, ns_path),
            other => {
                let Some(socket) = esocket.data.namespaces.get(&ns_path).map(|e| e.value().clone())
                else {
                    tracing::debug!(
                        "[sid={}] packet for namespace {ns_path} with no active socket",
                        esocket.id
                    );
                    return;
                };
                socket.recv(other);
            }
        }
    }

    /// Tears every namespace-scoped socket riding on `esocket` down (spec
    /// §4.4 — engine.io connection death always kills every socket.io
    /// socket multiplexed over it).
    fn disconnect_all(
        &self,
        esocket: &Arc<engineioxide::Socket<SocketData<A>>>,
        reason: engineioxide::DisconnectReason,
    ) {
        for entry in esocket.data.namespaces.iter() {
            entry.value().clone().close(reason.into());
        }
    }

    /// Closes every namespace (and therefore every socket) on server
    /// shutdown.
    pub(crate) fn close(&self) {
        for ns in self.namespaces() {
            ns.close();
        }
    }
}

impl<A: Adapter> engineioxide::EngineIoHandler for Arc<Client<A>> {
    type Data = SocketData<A>;

    fn on_connect(&self, _socket: Arc<engineioxide::Socket<Self::Data>>) {
        // The engine.io handshake alone does not admit any namespace; a
        // socket.io `CONNECT` packet is required per namespace (spec §4.5).
    }

    fn on_disconnect(
        &self,
        socket: Arc<engineioxide::Socket<Self::Data>>,
        reason: engineioxide::DisconnectReason,
    ) {
        self.disconnect_all(&socket, reason);
    }

    fn on_message(&self, msg: String, socket: Arc<engineioxide::Socket<Self::Data>>) {
        let packet = match self.decode(&msg) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::debug!("[sid={}] malformed packet header: {err}", socket.id);
                return;
            }
        };
        if needs_attachments(&packet) {
            *socket.data.partial_bin_packet.lock().unwrap() = Some(packet);
        } else {
            self.route(&socket, packet);
        }
    }

    fn on_binary(&self, data: Vec<u8>, socket: Arc<engineioxide::Socket<Self::Data>>) {
        let mut pending = socket.data.partial_bin_packet.lock().unwrap();
        match pending.take() {
            Some(mut packet) => {
                add_payload(&mut packet.inner, data);
                if is_complete(&packet.inner) {
                    drop(pending);
                    match packet.materialize() {
                        Ok(packet) => self.route(&socket, packet),
                        Err(err) => tracing::debug!(
                            "[sid={}] failed to materialize binary packet: {err}",
                            socket.id
                        ),
                    }
                } else {
                    *pending = Some(packet);
                }
            }
            None => {
                drop(pending);
                #[cfg(feature = "msgpack")]
                if self.config.codec == Codec::Msgpack {
                    match crate::packet::msgpack::decode(&data) {
                        Ok(packet) => self.route(&socket, packet),
                        Err(err) => {
                            tracing::debug!("[sid={}] malformed msgpack packet: {err}", socket.id)
                        }
                    }
                    return;
                }
                tracing::debug!(
                    "[sid={}] unexpected binary frame with no pending packet",
                    socket.id
                );
            }
        }
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

fn send_engine_packet<A: Adapter>(
    esocket: &Arc<engineioxide::Socket<SocketData<A>>>,
    codec: &Codec,
    packet: Packet,
) -> Result<(), engineioxide::Error> {
    match codec {
        Codec::Default => {
            let (header, attachments) = packet.encode();
            esocket.emit(engineioxide::packet::Packet::Message(
                engineioxide::packet::MessageBody::Text(header),
            ))?;
            for attachment in attachments {
                esocket.emit_binary(attachment.to_vec())?;
            }
            Ok(())
        }
        #[cfg(feature = "msgpack")]
        Codec::Msgpack => {
            let bytes = crate::packet::msgpack::encode(&packet)
                .map_err(|_| engineioxide::Error::BadPacket(engineioxide::packet::Packet::Noop))?;
            esocket.emit_binary(bytes.to_vec())
        }
    }
}
