//! The fluent broadcast builder returned by [`Socket::to`](crate::socket::Socket::to)
//! and [`Namespace::to`](crate::ns::Namespace) (spec §4.6/§4.7).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use engineioxide::Sid;
use tokio::sync::mpsc;

use crate::adapter::{Adapter, BroadcastFlags, BroadcastOptions, RoomParam};
use crate::ack::AckStream;
use crate::errors::{AdapterError, SendError};
use crate::ns::Namespace;
use crate::packet::Packet;
use crate::value::Value;

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// A broadcast scoped to a subset of a namespace's sockets, built up by
/// chaining `to`/`except`/`local`/`timeout`/`bin` before a terminal
/// `emit`/`emit_with_ack` (spec §4.6).
pub struct Operators<A: Adapter> {
    ns: Arc<Namespace<A>>,
    opts: BroadcastOptions,
    sender: Option<Sid>,
    ack_timeout: Duration,
    binary: Vec<Bytes>,
}

impl<A: Adapter> Operators<A> {
    pub(crate) fn new(ns: Arc<Namespace<A>>, sender: Option<Sid>) -> Self {
        Self {
            ns,
            opts: BroadcastOptions::default(),
            sender,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            binary: Vec::new(),
        }
    }

    /// Restricts the broadcast to sockets joined to any of `rooms`.
    pub fn to(mut self, rooms: impl RoomParam) -> Self {
        self.opts.rooms.extend(rooms.into_rooms());
        self
    }

    /// Excludes sockets joined to any of `rooms` from the broadcast.
    pub fn except(mut self, rooms: impl RoomParam) -> Self {
        self.opts.except.extend(rooms.into_rooms());
        self
    }

    /// Restricts the broadcast to this process (always true for
    /// [`crate::adapter::LocalAdapter`]; kept for API parity with a future
    /// distributed adapter).
    pub fn local(mut self) -> Self {
        self.opts.flags.insert(BroadcastFlags::Local);
        self
    }

    /// Overrides how long `emit_with_ack` waits for each targeted socket's
    /// reply (spec §4.6: "Timeouts are not built in; callers may implement
    /// them around Emit").
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.opts.flags.insert(BroadcastFlags::Timeout);
        self.ack_timeout = duration;
        self
    }

    /// Attaches binary blobs to be referenced by placeholders inside the
    /// emitted event's data.
    pub fn bin(mut self, binary: Vec<Bytes>) -> Self {
        self.binary = binary;
        self
    }

    fn targets(&self) -> Vec<Sid> {
        let mut targets = self.ns.adapter().sockets(&self.opts);
        if let Some(sender) = self.sender {
            targets.retain(|sid| *sid != sender);
        }
        targets
    }

    fn build_packet(&self, event: &str, data: Value) -> Packet {
        let mut items = vec![Value::String(event.to_string())];
        if let Value::Array(mut rest) = data {
            items.append(&mut rest);
        } else {
            items.push(data);
        }
        let mut data = Value::Array(items);
        if !self.binary.is_empty() {
            data = attach_binary(data, &self.binary);
        }
        Packet::event(self.ns.path(), data, None)
    }

    /// Emits `event` with `data` to every targeted socket (spec §4.6 `Emit`,
    /// §8 "a snapshot of membership taken at broadcast time").
    pub fn emit(self, event: &str, data: Value) -> Result<(), AdapterError> {
        let packet = self.build_packet(event, data);
        for sid in self.targets() {
            if let Some(socket) = self.ns.get_socket(sid) {
                if let Err(err) = socket.send(packet.clone()) {
                    tracing::debug!("[sid={sid}] broadcast emit failed: {err}");
                }
            }
        }
        Ok(())
    }

    /// Emits `event` to every targeted socket and returns a stream of their
    /// acks, each resolving independently within `self.ack_timeout` (spec
    /// §4.7 style fan-out ack collection).
    pub fn emit_with_ack(self, event: &str, data: Value) -> Result<AckStream, AdapterError> {
        let packet_template = self.build_packet(event, data);
        let (tx, rx) = mpsc::unbounded_channel();
        let timeout = self.ack_timeout;
        for sid in self.targets() {
            let Some(socket) = self.ns.get_socket(sid) else {
                continue;
            };
            let tx = tx.clone();
            let mut packet = packet_template.clone();
            let (ack_id, ack_rx) = socket.register_ack();
            set_ack_id(&mut packet, ack_id);
            if let Err(err) = socket.send(packet) {
                let _ = tx.send(Err(SendError::from(err).into()));
                continue;
            }
            tokio::spawn(async move {
                let result = crate::ack::wait_for_ack(ack_rx, timeout).await;
                let _ = tx.send(result);
            });
        }
        Ok(AckStream::new(rx))
    }

    pub fn get_packet(&self, event: &str, data: Value) -> Packet {
        self.build_packet(event, data)
    }
}

fn attach_binary(data: Value, binary: &[Bytes]) -> Value {
    let items = match data {
        Value::Array(items) => items,
        other => vec![other],
    };
    let mut items = items;
    items.extend(binary.iter().cloned().map(Value::Blob));
    Value::Array(items)
}

fn set_ack_id(packet: &mut Packet, id: i64) {
    use crate::packet::PacketData;
    match &mut packet.inner {
        PacketData::Event(_, ack_id) => *ack_id = Some(id),
        PacketData::BinaryEvent(_, ack_id) => *ack_id = Some(id),
        _ => {}
    }
}
