//! The application packet (spec §3) and its two wire codecs: the default
//! text+binary framing (C2, this module) and the alternative single-blob
//! framing ([`msgpack`], C3).

#[cfg(feature = "msgpack")]
pub mod msgpack;

use bytes::Bytes;
use engineioxide::Sid;

use crate::value::{self, PlaceholderError, Value};

/// The seven application-layer packet types, in wire-opcode order (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketType {
    pub fn opcode(self) -> u8 {
        match self {
            PacketType::Connect => 0,
            PacketType::Disconnect => 1,
            PacketType::Event => 2,
            PacketType::Ack => 3,
            PacketType::ConnectError => 4,
            PacketType::BinaryEvent => 5,
            PacketType::BinaryAck => 6,
        }
    }
}

/// A binary packet waiting for its attachments to arrive. `data` still
/// contains `{"_placeholder":true,"num":N}` markers until
/// [`Packet::materialize`] substitutes them.
#[derive(Debug, Clone, Default)]
pub struct BinaryPacket {
    pub data: Option<Value>,
    pub payload_count: usize,
    pub payloads: Vec<Bytes>,
}

impl BinaryPacket {
    pub fn add_payload(&mut self, data: Vec<u8>) {
        self.payloads.push(Bytes::from(data));
    }

    pub fn is_complete(&self) -> bool {
        self.payloads.len() >= self.payload_count
    }
}

#[derive(Debug, Clone)]
pub enum PacketData {
    Connect(Option<Value>),
    Disconnect,
    Event(Value, Option<i64>),
    Ack(Value, i64),
    ConnectError(String),
    BinaryEvent(BinaryPacket, Option<i64>),
    BinaryAck(BinaryPacket, i64),
}

impl PacketData {
    pub fn packet_type(&self) -> PacketType {
        match self {
            PacketData::Connect(_) => PacketType::Connect,
            PacketData::Disconnect => PacketType::Disconnect,
            PacketData::Event(_, _) => PacketType::Event,
            PacketData::Ack(_, _) => PacketType::Ack,
            PacketData::ConnectError(_) => PacketType::ConnectError,
            PacketData::BinaryEvent(_, _) => PacketType::BinaryEvent,
            PacketData::BinaryAck(_, _) => PacketType::BinaryAck,
        }
    }
}

/// An application-layer packet, scoped to one namespace.
#[derive(Debug, Clone)]
pub struct Packet {
    pub ns: String,
    pub inner: PacketData,
}

/// Which of the two wire codecs a server/client uses for every packet it
/// exchanges (spec §4.1/§4.2). Chosen once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// The default text header + binary attachment stream framing (C2).
    #[default]
    Default,
    /// The alternative single MessagePack document framing (C3).
    #[cfg(feature = "msgpack")]
    Msgpack,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PacketParseError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type digit: {0}")]
    UnknownType(char),
    #[error("malformed packet header")]
    MalformedHeader,
    #[error("invalid json payload: {0}")]
    InvalidJson(String),
    #[error("placeholder substitution failed: {0}")]
    Placeholder(#[from] PlaceholderError),
}

impl Packet {
    pub fn connect(ns: impl Into<String>, sid: Sid) -> Self {
        let payload = Value::Object(vec![("sid".to_string(), Value::String(sid.to_string()))]);
        Packet {
            ns: ns.into(),
            inner: PacketData::Connect(Some(payload)),
        }
    }

    pub fn disconnect(ns: impl Into<String>) -> Self {
        Packet {
            ns: ns.into(),
            inner: PacketData::Disconnect,
        }
    }

    pub fn invalid_namespace(ns: impl Into<String>) -> Self {
        Packet {
            ns: ns.into(),
            inner: PacketData::ConnectError("Invalid namespace".to_string()),
        }
    }

    pub fn event(ns: impl Into<String>, data: Value, id: Option<i64>) -> Self {
        let ns = ns.into();
        if data.has_binary() {
            Packet {
                ns,
                inner: PacketData::BinaryEvent(
                    BinaryPacket {
                        data: Some(data),
                        payload_count: 0,
                        payloads: Vec::new(),
                    },
                    id,
                ),
            }
        } else {
            Packet {
                ns,
                inner: PacketData::Event(data, id),
            }
        }
    }

    pub fn ack(ns: impl Into<String>, data: Value, id: i64) -> Self {
        let ns = ns.into();
        if data.has_binary() {
            Packet {
                ns,
                inner: PacketData::BinaryAck(
                    BinaryPacket {
                        data: Some(data),
                        payload_count: 0,
                        payloads: Vec::new(),
                    },
                    id,
                ),
            }
        } else {
            Packet {
                ns,
                inner: PacketData::Ack(data, id),
            }
        }
    }

    /// Once every attachment of a `BINARY_*` packet has arrived, substitutes
    /// the placeholders back into the payload and collapses the packet down
    /// to the plain `Event`/`Ack` variant.
    pub fn materialize(self) -> Result<Packet, PacketParseError> {
        let ns = self.ns;
        let inner = match self.inner {
            PacketData::BinaryEvent(bin, id) => {
                let data = value::substitute_placeholders(
                    bin.data.unwrap_or(Value::Array(Vec::new())),
                    &bin.payloads,
                )?;
                PacketData::Event(data, id)
            }
            PacketData::BinaryAck(bin, id) => {
                let data = value::substitute_placeholders(
                    bin.data.unwrap_or(Value::Array(Vec::new())),
                    &bin.payloads,
                )?;
                PacketData::Ack(data, id)
            }
            other => other,
        };
        Ok(Packet { ns, inner })
    }

    /// Serializes this packet to its textual header plus, for `BINARY_*`
    /// packets, the ordered list of attachment frames that must follow it
    /// (spec §4.1).
    pub fn encode(&self) -> (String, Vec<Bytes>) {
        let mut attachments = Vec::new();
        let header = encode_header(self, &mut attachments);
        (header, attachments)
    }

    /// Parses just the textual header. For `BINARY_*` types the returned
    /// packet's `BinaryPacket::payload_count` tells the caller how many raw
    /// binary frames to collect (via [`BinaryPacket::add_payload`]) before
    /// calling [`Packet::materialize`].
    pub fn decode_header(s: &str) -> Result<Packet, PacketParseError> {
        let mut chars = s.chars();
        let type_digit = chars.next().ok_or(PacketParseError::Empty)?;
        let mut rest = chars.as_str();

        let is_binary = matches!(type_digit, '5' | '6');
        let mut payload_count = 0;
        if is_binary {
            let dash = rest.find('-').ok_or(PacketParseError::MalformedHeader)?;
            payload_count = rest[..dash]
                .parse::<usize>()
                .map_err(|_| PacketParseError::MalformedHeader)?;
            rest = &rest[dash + 1..];
        }

        let ns = if let Some(stripped) = rest.strip_prefix('/') {
            let comma = stripped
                .find(',')
                .ok_or(PacketParseError::MalformedHeader)?;
            let ns = format!("/{}", &stripped[..comma]);
            rest = &stripped[comma + 1..];
            ns
        } else {
            "/".to_string()
        };

        let digit_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let id = if digit_len > 0 {
            let id: i64 = rest[..digit_len]
                .parse()
                .map_err(|_| PacketParseError::MalformedHeader)?;
            rest = &rest[digit_len..];
            Some(id)
        } else {
            None
        };

        let payload: Value = if rest.is_empty() {
            Value::Array(Vec::new())
        } else {
            serde_json::from_str::<serde_json::Value>(rest)
                .map_err(|e| PacketParseError::InvalidJson(e.to_string()))?
                .into()
        };

        let inner = match type_digit {
            '0' => PacketData::Connect(if rest.is_empty() { None } else { Some(payload) }),
            '1' => PacketData::Disconnect,
            '2' => PacketData::Event(payload, id),
            '3' => PacketData::Ack(payload, id.ok_or(PacketParseError::MalformedHeader)?),
            '4' => PacketData::ConnectError(connect_error_message(&payload)),
            '5' => PacketData::BinaryEvent(
                BinaryPacket {
                    data: Some(payload),
                    payload_count,
                    payloads: Vec::new(),
                },
                id,
            ),
            '6' => PacketData::BinaryAck(
                BinaryPacket {
                    data: Some(payload),
                    payload_count,
                    payloads: Vec::new(),
                },
                id.ok_or(PacketParseError::MalformedHeader)?,
            ),
            other => return Err(PacketParseError::UnknownType(other)),
        };

        Ok(Packet { ns, inner })
    }
}

/// Pulls the human-readable reason out of a `CONNECT_ERROR` payload, which
/// upstream clients send as `{"message": "..."}` but which this crate also
/// accepts as a bare string (spec §4.1, shared by both wire codecs).
pub(crate) fn connect_error_message(payload: &Value) -> String {
    match payload {
        Value::Object(fields) => fields
            .iter()
            .find(|(k, _)| k == "message")
            .and_then(|(_, v)| v.as_str())
            .map(str::to_string)
            .unwrap_or_default(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn encode_header(packet: &Packet, attachments: &mut Vec<Bytes>) -> String {
    let mut out = String::new();
    out.push((b'0' + packet.inner.packet_type().opcode()) as char);

    if let PacketData::BinaryEvent(bin, _) | PacketData::BinaryAck(bin, _) = &packet.inner {
        let data = bin.data.clone().unwrap_or(Value::Array(Vec::new()));
        let json = value::extract_placeholders(&data, attachments);
        out.push_str(&format!("{}-", attachments.len()));
        if packet.ns != "/" {
            out.push_str(&format!("{},", packet.ns));
        }
        if let PacketData::BinaryEvent(_, Some(id)) | PacketData::BinaryAck(_, id) =
            &packet.inner
        {
            out.push_str(&id.to_string());
            let _ = id;
        }
        out.push_str(&json.to_string());
        return out;
    }

    if packet.ns != "/" {
        out.push_str(&format!("{},", packet.ns));
    }

    match &packet.inner {
        PacketData::Connect(payload) => {
            if let Some(payload) = payload {
                let json = value::extract_placeholders(payload, attachments);
                out.push_str(&json.to_string());
            }
        }
        PacketData::Disconnect => {}
        PacketData::Event(data, id) => {
            if let Some(id) = id {
                out.push_str(&id.to_string());
            }
            let json = value::extract_placeholders(data, attachments);
            out.push_str(&json.to_string());
        }
        PacketData::Ack(data, id) => {
            out.push_str(&id.to_string());
            let json = value::extract_placeholders(data, attachments);
            out.push_str(&json.to_string());
        }
        PacketData::ConnectError(message) => {
            out.push_str(&serde_json::json!({ "message": message }).to_string());
        }
        PacketData::BinaryEvent(..) | PacketData::BinaryAck(..) => unreachable!(),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_default_namespace_event_without_id() {
        let data = Value::Array(vec![
            Value::String("echo".into()),
            Value::String("hi".into()),
        ]);
        let packet = Packet::event("/", data, None);
        let (header, attachments) = packet.encode();
        assert_eq!(header, r#"2["echo","hi"]"#);
        assert!(attachments.is_empty());
    }

    #[test]
    fn encodes_an_event_with_ack_id_and_custom_namespace() {
        let data = Value::Array(vec![
            Value::String("echo".into()),
            Value::String("hi".into()),
        ]);
        let packet = Packet::event("/x", data, Some(7));
        let (header, _) = packet.encode();
        assert_eq!(header, r#"2/x,7["echo","hi"]"#);
    }

    #[test]
    fn encodes_an_ack_reply() {
        let packet = Packet::ack("/x", Value::Array(vec![Value::String("hi".into())]), 7);
        let (header, _) = packet.encode();
        assert_eq!(header, r#"3/x,7["hi"]"#);
    }

    #[test]
    fn decodes_a_plain_event_header() {
        let packet = Packet::decode_header(r#"2["echo","hi"]"#).unwrap();
        assert_eq!(packet.ns, "/");
        match packet.inner {
            PacketData::Event(data, None) => {
                assert_eq!(
                    data,
                    Value::Array(vec![Value::String("echo".into()), Value::String("hi".into())])
                );
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn decodes_namespace_and_id() {
        let packet = Packet::decode_header(r#"2/x,7["echo","hi"]"#).unwrap();
        assert_eq!(packet.ns, "/x");
        assert!(matches!(packet.inner, PacketData::Event(_, Some(7))));
    }

    #[test]
    fn round_trips_a_binary_event() {
        let data = Value::Array(vec![
            Value::String("binary".into()),
            Value::Blob(Bytes::from_static(&[1, 2, 3, 4])),
        ]);
        let packet = Packet::event("/", data.clone(), None);
        let (header, attachments) = packet.encode();
        assert_eq!(header, r#"51-["binary",{"_placeholder":true,"num":0}]"#);
        assert_eq!(attachments, vec![Bytes::from_static(&[1, 2, 3, 4])]);

        let mut decoded = Packet::decode_header(&header).unwrap();
        if let PacketData::BinaryEvent(ref mut bin, _) = decoded.inner {
            assert_eq!(bin.payload_count, 1);
            bin.add_payload(attachments[0].to_vec());
            assert!(bin.is_complete());
        } else {
            panic!("expected a binary event");
        }
        let materialized = decoded.materialize().unwrap();
        match materialized.inner {
            PacketData::Event(decoded_data, None) => assert_eq!(decoded_data, data),
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn decodes_connect_error() {
        let packet =
            Packet::decode_header(r#"4/admin,{"message":"Invalid namespace"}"#).unwrap();
        assert_eq!(packet.ns, "/admin");
        assert!(matches!(packet.inner, PacketData::ConnectError(ref m) if m == "Invalid namespace"));
    }

    #[test]
    fn unknown_type_digit_is_an_error() {
        assert_eq!(
            Packet::decode_header("9[]").unwrap_err(),
            PacketParseError::UnknownType('9')
        );
    }
}
