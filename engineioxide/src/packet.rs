//! The fixed five-opcode (well, seven — OPEN/CLOSE/PING/PONG/MESSAGE/UPGRADE/NOOP)
//! engine.io wire framing (spec §4.3, §4.4).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::EngineIoConfig;
use crate::sid::Sid;
use crate::transport::TransportType;

/// The body of an `OPEN` packet, sent once at handshake time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    pub sid: Sid,
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    pub max_payload: u64,
}

impl OpenPacket {
    pub fn new(transport: TransportType, sid: Sid, config: &EngineIoConfig) -> Self {
        let upgrades = match transport {
            TransportType::Polling => vec!["websocket".to_string()],
            TransportType::Websocket => vec![],
        };
        Self {
            sid,
            upgrades,
            ping_interval: config.ping_interval.as_millis() as u64,
            ping_timeout: config.ping_timeout.as_millis() as u64,
            max_payload: config.max_payload,
        }
    }
}

/// The body carried by a `MESSAGE` packet: either textual (the socket.io
/// application header packet) or binary (an attachment blob).
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Binary(Bytes),
}

/// An engine.io packet, as defined by spec §3/§4.3.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenPacket),
    Close,
    Ping(Option<Bytes>),
    Pong(Option<Bytes>),
    Message(MessageBody),
    Upgrade,
    Noop,
}

impl Packet {
    /// The single ASCII decimal digit identifying this packet's opcode.
    pub fn opcode(&self) -> u8 {
        match self {
            Packet::Open(_) => 0,
            Packet::Close => 1,
            Packet::Ping(_) => 2,
            Packet::Pong(_) => 3,
            Packet::Message(_) => 4,
            Packet::Upgrade => 5,
            Packet::Noop => 6,
        }
    }

    /// `true` for packets that must be carried on a binary frame because
    /// their body is binary.
    pub fn is_binary(&self) -> bool {
        matches!(self, Packet::Message(MessageBody::Binary(_)))
    }
}

/// An error while decoding an engine.io packet.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PacketParseError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet opcode: {0}")]
    UnknownOpcode(u8),
    #[error("invalid open packet body: {0}")]
    InvalidOpenBody(String),
}

impl TryFrom<&str> for Packet {
    type Error = PacketParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut chars = value.chars();
        let opcode = chars.next().ok_or(PacketParseError::Empty)?;
        let body = chars.as_str();
        match opcode {
            '0' => {
                let open: OpenPacket = serde_json::from_str(body)
                    .map_err(|e| PacketParseError::InvalidOpenBody(e.to_string()))?;
                Ok(Packet::Open(open))
            }
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping(non_empty_bytes(body))),
            '3' => Ok(Packet::Pong(non_empty_bytes(body))),
            '4' => Ok(Packet::Message(MessageBody::Text(body.to_string()))),
            '5' => Ok(Packet::Upgrade),
            '6' => Ok(Packet::Noop),
            other => Err(PacketParseError::UnknownOpcode(other as u8)),
        }
    }
}

impl TryFrom<String> for Packet {
    type Error = PacketParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Packet::try_from(value.as_str())
    }
}

/// Decodes a single raw binary frame: leading raw byte is the opcode
/// (0..6), the remainder is the body (spec §4.3).
impl TryFrom<Bytes> for Packet {
    type Error = PacketParseError;

    fn try_from(value: Bytes) -> Result<Self, Self::Error> {
        let opcode = *value.first().ok_or(PacketParseError::Empty)?;
        let body = value.slice(1..);
        match opcode {
            2 => Ok(Packet::Ping(non_empty(body))),
            3 => Ok(Packet::Pong(non_empty(body))),
            4 => Ok(Packet::Message(MessageBody::Binary(body))),
            other => Err(PacketParseError::UnknownOpcode(other)),
        }
    }
}

impl From<Packet> for String {
    fn from(packet: Packet) -> Self {
        let opcode = packet.opcode();
        let body = match packet {
            Packet::Open(open) => serde_json::to_string(&open).unwrap_or_default(),
            Packet::Close | Packet::Upgrade | Packet::Noop => String::new(),
            Packet::Ping(body) => body.map(bytes_to_string).unwrap_or_default(),
            Packet::Pong(body) => body.map(bytes_to_string).unwrap_or_default(),
            Packet::Message(MessageBody::Text(text)) => text,
            Packet::Message(MessageBody::Binary(_)) => {
                unreachable!("binary message bodies must be sent as a binary frame")
            }
        };
        format!("{opcode}{body}")
    }
}

/// Encodes a packet for a binary websocket frame (leading raw opcode byte).
impl From<Packet> for Bytes {
    fn from(packet: Packet) -> Self {
        let opcode = packet.opcode();
        let mut buf = Vec::with_capacity(1);
        buf.push(opcode);
        match packet {
            Packet::Ping(Some(body)) | Packet::Pong(Some(body)) => buf.extend_from_slice(&body),
            Packet::Message(MessageBody::Binary(body)) => buf.extend_from_slice(&body),
            _ => {}
        }
        Bytes::from(buf)
    }
}

fn non_empty_bytes(s: &str) -> Option<Bytes> {
    if s.is_empty() {
        None
    } else {
        Some(Bytes::from(s.as_bytes().to_vec()))
    }
}

fn non_empty(b: Bytes) -> Option<Bytes> {
    if b.is_empty() {
        None
    } else {
        Some(b)
    }
}

fn bytes_to_string(b: Bytes) -> String {
    String::from_utf8_lossy(&b).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ping_pong() {
        assert_eq!(Packet::try_from("2").unwrap(), Packet::Ping(None));
        assert_eq!(Packet::try_from("3").unwrap(), Packet::Pong(None));
        assert_eq!(
            Packet::try_from("2probe").unwrap(),
            Packet::Ping(Some(Bytes::from_static(b"probe")))
        );
    }

    #[test]
    fn decodes_message() {
        assert_eq!(
            Packet::try_from("4hello").unwrap(),
            Packet::Message(MessageBody::Text("hello".into()))
        );
    }

    #[test]
    fn unknown_opcode_errors() {
        assert!(matches!(
            Packet::try_from("9hello"),
            Err(PacketParseError::UnknownOpcode(_))
        ));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let packet = Packet::Message(MessageBody::Text("2[\"hi\"]".into()));
        let text: String = packet.clone().into();
        assert_eq!(Packet::try_from(text.as_str()).unwrap(), packet);
    }

    #[test]
    fn binary_frame_roundtrip() {
        let packet = Packet::Message(MessageBody::Binary(Bytes::from_static(&[1, 2, 3])));
        let bytes: Bytes = packet.clone().into();
        assert_eq!(Packet::try_from(bytes).unwrap(), packet);
    }

    #[test]
    fn open_packet_roundtrips_json() {
        let config = EngineIoConfig::default();
        let open = OpenPacket::new(TransportType::Polling, Sid::new(), &config);
        let packet = Packet::Open(open.clone());
        let text: String = packet.into();
        let decoded = Packet::try_from(text.as_str()).unwrap();
        assert_eq!(decoded, Packet::Open(open));
    }
}
