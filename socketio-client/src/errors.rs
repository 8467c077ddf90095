//! Error types for dialing, decoding, and awaiting acknowledgements on the
//! client side of the wire protocol.

/// Errors that can occur while dialing, decoding, or routing packets for a
/// client connection.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("engine.io handshake failed: {0}")]
    Handshake(String),

    #[error("engine.io packet parsing error: {0}")]
    EnginePacketParsing(#[from] engineioxide::packet::PacketParseError),

    #[error("application packet parsing error: {0}")]
    PacketParsing(#[from] socketioxide::packet::PacketParseError),

    #[error("namespace {0} rejected the connection: {1}")]
    ConnectRejected(String, String),

    #[error("received an ACK for unknown id {0}")]
    UnknownAck(i64),

    #[error("the connection is closed")]
    Closed,

    #[error(transparent)]
    Send(#[from] socketioxide::errors::SendError),

    #[error(transparent)]
    Ack(#[from] socketioxide::errors::AckError),
}
