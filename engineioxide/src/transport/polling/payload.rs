//! Packet framing for the long-polling transport (spec §4.3): multiple
//! packets are concatenated in one HTTP body, each preceded by its length
//! in ASCII decimal followed by `:`.

use base64::Engine;
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use tokio::sync::mpsc;

use crate::errors::Error;
use crate::packet::{MessageBody, Packet, PacketParseError};

pub struct Payload {
    pub data: Bytes,
    pub has_binary: bool,
}

/// Serializes a single packet the way it is carried inside a polling payload:
/// binary `MESSAGE` bodies are base64-encoded behind a `b` marker byte so the
/// whole payload stays representable as text; everything else is the plain
/// digit-prefixed textual form (spec §4.1/§4.3).
fn packet_to_payload_chunk(packet: Packet) -> (String, bool) {
    if let Packet::Message(MessageBody::Binary(bytes)) = &packet {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        (format!("b4{encoded}"), true)
    } else {
        (String::from(packet), false)
    }
}

fn parse_payload_chunk(chunk: &str) -> Result<Packet, PacketParseError> {
    if let Some(rest) = chunk.strip_prefix('b') {
        let mut chars = rest.chars();
        let opcode = chars.next().ok_or(PacketParseError::Empty)?;
        if opcode != '4' {
            return Err(PacketParseError::UnknownOpcode(opcode as u8));
        }
        let encoded = chars.as_str();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| PacketParseError::InvalidOpenBody(e.to_string()))?;
        Ok(Packet::Message(MessageBody::Binary(Bytes::from(bytes))))
    } else {
        Packet::try_from(chunk)
    }
}

/// Drains whatever is currently queued for a session (waiting for at least
/// one packet) and frames it as a single polling response body.
pub async fn encoder(
    mut rx: tokio::sync::MutexGuard<'_, mpsc::Receiver<Packet>>,
    max_payload: u64,
) -> Result<Payload, Error> {
    let mut out = BytesMut::new();
    let mut has_binary = false;

    let first = rx.recv().await.ok_or(Error::SessionClosed)?;
    append_chunk(&mut out, &mut has_binary, first);

    while out.len() < max_payload as usize {
        match rx.try_recv() {
            Ok(packet) => append_chunk(&mut out, &mut has_binary, packet),
            Err(_) => break,
        }
    }

    Ok(Payload {
        data: out.freeze(),
        has_binary,
    })
}

fn append_chunk(out: &mut BytesMut, has_binary: &mut bool, packet: Packet) {
    let (chunk, binary) = packet_to_payload_chunk(packet);
    *has_binary |= binary;
    out.extend_from_slice(format!("{}:{}", chunk.chars().count(), chunk).as_bytes());
}

/// Parses a length-prefixed polling POST body into a stream of packets.
///
/// The whole body is collected up front (it is bounded by `max_payload`
/// anyway), then split into its length-prefixed chunks; the result is
/// handed back as a `Stream` so callers can process packets with
/// `StreamExt::next()` the same way they would a live transport.
pub async fn decoder<R>(
    body: http::Request<R>,
    max_payload: u64,
) -> impl futures_core::Stream<Item = Result<Packet, PacketParseError>>
where
    R: http_body::Body + Send + Unpin + 'static,
    R::Error: std::fmt::Debug,
{
    let mut results = Vec::new();
    let collected = match body.into_body().collect().await {
        Ok(c) => c.to_bytes(),
        Err(_) => {
            results.push(Err(PacketParseError::Empty));
            return futures_util::stream::iter(results);
        }
    };
    if collected.len() as u64 > max_payload {
        results.push(Err(PacketParseError::Empty));
        return futures_util::stream::iter(results);
    }
    let text = String::from_utf8_lossy(&collected).into_owned();
    let mut rest = text.as_str();
    while !rest.is_empty() {
        let Some(colon) = rest.find(':') else {
            results.push(Err(PacketParseError::Empty));
            break;
        };
        let Ok(len) = rest[..colon].parse::<usize>() else {
            results.push(Err(PacketParseError::Empty));
            break;
        };
        let after = &rest[colon + 1..];
        if after.len() < len {
            results.push(Err(PacketParseError::Empty));
            break;
        }
        let chunk = &after[..len];
        results.push(parse_payload_chunk(chunk));
        rest = &after[len..];
    }
    futures_util::stream::iter(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn encoder_frames_single_packet() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Packet::Noop).await.unwrap();
        drop(tx);
        let guard = tokio::sync::Mutex::new(rx);
        let payload = encoder(guard.lock().await, 1_000_000).await.unwrap();
        assert_eq!(payload.data, Bytes::from_static(b"1:6"));
        assert!(!payload.has_binary);
    }

    #[tokio::test]
    async fn encoder_frames_multiple_ready_packets() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Packet::Noop).await.unwrap();
        tx.send(Packet::Close).await.unwrap();
        let guard = tokio::sync::Mutex::new(rx);
        let payload = encoder(guard.lock().await, 1_000_000).await.unwrap();
        assert_eq!(payload.data, Bytes::from_static(b"1:61:1"));
    }

    #[tokio::test]
    async fn decoder_parses_length_prefixed_body() {
        let req = http::Request::builder()
            .body(http_body_util::Full::new(Bytes::from_static(b"1:61:1")))
            .unwrap();
        let stream = decoder(req, 1_000_000).await;
        futures_util::pin_mut!(stream);
        assert_eq!(stream.next().await.unwrap().unwrap(), Packet::Noop);
        assert_eq!(stream.next().await.unwrap().unwrap(), Packet::Close);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn binary_chunk_roundtrips_base64() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Packet::Message(MessageBody::Binary(Bytes::from_static(&[
            1, 2, 3,
        ]))))
        .await
        .unwrap();
        drop(tx);
        let guard = tokio::sync::Mutex::new(rx);
        let payload = encoder(guard.lock().await, 1_000_000).await.unwrap();
        assert!(payload.has_binary);

        let req = http::Request::builder()
            .body(http_body_util::Full::new(payload.data))
            .unwrap();
        let stream = decoder(req, 1_000_000).await;
        futures_util::pin_mut!(stream);
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Packet::Message(MessageBody::Binary(Bytes::from_static(&[1, 2, 3])))
        );
    }
}
