//! Error types for the namespace/socket layer (spec §7 classes 2, 5).

use engineioxide::Sid;

/// Errors that can occur while routing or dispatching an application packet.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("namespace {0} is not registered")]
    InvalidNamespace(String),

    #[error("socket {0} is not connected to this namespace")]
    SocketNotFound(Sid),

    #[error("packet parsing error: {0}")]
    PacketParsing(#[from] crate::packet::PacketParseError),

    #[error("received an ACK for unknown id {0}")]
    UnknownAck(i64),

    #[error("failed to serialize event data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("engine.io error: {0}")]
    EngineIo(#[from] engineioxide::Error),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Ack(#[from] AckError),
}

/// An error emitting a packet to a socket (spec §4.6 `Emit`).
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    #[error("the socket's egress queue is full")]
    InternalChannelFull,
    #[error("the socket is disconnected")]
    Closed,
    #[error("failed to serialize event data: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to encode packet: {0}")]
    Encode(#[from] crate::packet::PacketParseError),
}

impl From<engineioxide::Error> for SendError {
    fn from(e: engineioxide::Error) -> Self {
        match e {
            engineioxide::Error::InternalChannelFull => SendError::InternalChannelFull,
            engineioxide::Error::SessionClosed => SendError::Closed,
            _ => SendError::Closed,
        }
    }
}

/// An error awaiting or delivering an acknowledgement (spec §4.6).
#[derive(thiserror::Error, Debug)]
pub enum AckError {
    #[error("no ack arrived before the caller stopped waiting")]
    Timeout,
    #[error("the socket disconnected before the ack arrived")]
    Closed,
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("failed to deserialize ack payload: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// An error tearing down a socket's disconnect handler (spec §7 class 5).
#[derive(thiserror::Error, Debug)]
pub enum DisconnectError {
    #[error(transparent)]
    Send(#[from] SendError),
}

/// An error broadcasting through an [`Adapter`](crate::adapter::Adapter).
#[derive(thiserror::Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Send(#[from] SendError),
}
