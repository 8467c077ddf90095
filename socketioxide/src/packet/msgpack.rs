//! The alternative single-blob codec (spec §4.2, C3): the whole packet —
//! type, namespace, id, and payload — is carried as one self-describing
//! MessagePack document instead of the default text header + binary
//! attachment stream (§4.1). Gated behind the `msgpack` cargo feature,
//! which is also what pulls in `rmp-serde` (see the crate's `Cargo.toml`).
//!
//! Because [`Value`] serializes its [`Value::Blob`] leaves as native
//! MessagePack binary (see `value.rs`), a packet's attachments travel
//! inline in `data` here; there is no separate attachment stream and no
//! placeholder substitution to perform.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{connect_error_message, Packet, PacketData, PacketParseError};
use crate::value::Value;

#[derive(Serialize, Deserialize)]
struct WireForm {
    #[serde(rename = "type")]
    ty: u8,
    nsp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

fn data_of(inner: &PacketData) -> Option<Value> {
    match inner {
        PacketData::Connect(data) => data.clone(),
        PacketData::Disconnect => None,
        PacketData::Event(data, _) | PacketData::Ack(data, _) => Some(data.clone()),
        PacketData::BinaryEvent(bin, _) | PacketData::BinaryAck(bin, _) => bin.data.clone(),
        PacketData::ConnectError(message) => Some(Value::String(message.clone())),
    }
}

fn id_of(inner: &PacketData) -> Option<i64> {
    match inner {
        PacketData::Event(_, id) | PacketData::BinaryEvent(_, id) => *id,
        PacketData::Ack(_, id) | PacketData::BinaryAck(_, id) => Some(*id),
        _ => None,
    }
}

/// Serializes `packet` as a single MessagePack document (spec §4.2).
pub fn encode(packet: &Packet) -> Result<Bytes, PacketParseError> {
    let wire = WireForm {
        ty: packet.inner.packet_type().opcode(),
        nsp: packet.ns.clone(),
        id: id_of(&packet.inner),
        data: data_of(&packet.inner),
    };
    rmp_serde::to_vec_named(&wire)
        .map(Bytes::from)
        .map_err(|e| PacketParseError::InvalidJson(e.to_string()))
}

/// Parses a single MessagePack document back into a [`Packet`]. Unlike the
/// default codec's `decode_header`, this never returns a packet still
/// waiting on attachments: everything needed is already in `data`.
pub fn decode(bytes: &[u8]) -> Result<Packet, PacketParseError> {
    let wire: WireForm =
        rmp_serde::from_slice(bytes).map_err(|e| PacketParseError::InvalidJson(e.to_string()))?;

    let packet = match wire.ty {
        0 => Packet {
            ns: wire.nsp,
            inner: PacketData::Connect(wire.data),
        },
        1 => Packet {
            ns: wire.nsp,
            inner: PacketData::Disconnect,
        },
        2 | 5 => Packet::event(wire.nsp, wire.data.unwrap_or(Value::Array(Vec::new())), wire.id),
        3 | 6 => Packet::ack(
            wire.nsp,
            wire.data.unwrap_or(Value::Array(Vec::new())),
            wire.id.ok_or(PacketParseError::MalformedHeader)?,
        ),
        4 => Packet {
            ns: wire.nsp,
            inner: PacketData::ConnectError(connect_error_message(
                &wire.data.unwrap_or(Value::Null),
            )),
        },
        other => return Err(PacketParseError::UnknownType((b'0' + other) as char)),
    };
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_plain_event() {
        let data = Value::Array(vec![
            Value::String("echo".into()),
            Value::String("hi".into()),
        ]);
        let packet = Packet::event("/x", data.clone(), Some(7));
        let bytes = encode(&packet).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.ns, "/x");
        match decoded.inner {
            PacketData::Event(decoded_data, Some(7)) => assert_eq!(decoded_data, data),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn round_trips_a_binary_event_without_placeholders() {
        let data = Value::Array(vec![
            Value::String("binary".into()),
            Value::Blob(Bytes::from_static(&[1, 2, 3, 4])),
        ]);
        let packet = Packet::event("/", data.clone(), None);
        let bytes = encode(&packet).unwrap();
        let decoded = decode(&bytes).unwrap();
        match decoded.inner {
            PacketData::Event(decoded_data, None) => assert_eq!(decoded_data, data),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn round_trips_connect_and_disconnect() {
        let sid = engineioxide::Sid::new();
        let connect = Packet::connect("/chat", sid);
        let bytes = encode(&connect).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.ns, "/chat");
        assert!(matches!(decoded.inner, PacketData::Connect(Some(_))));

        let disconnect = Packet::disconnect("/chat");
        let bytes = encode(&disconnect).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert!(matches!(decoded.inner, PacketData::Disconnect));
    }

    #[test]
    fn round_trips_an_ack() {
        let packet = Packet::ack("/", Value::Array(vec![Value::String("hi".into())]), 3);
        let bytes = encode(&packet).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert!(matches!(decoded.inner, PacketData::Ack(_, 3)));
    }
}
