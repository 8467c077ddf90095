//! Error types returned by the engine.io transport layer.

use crate::sid::Sid;

/// Errors that can occur while handling engine.io packets or sessions.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The `sid` query parameter did not match any known session.
    #[error("unknown session id: {0}")]
    UnknownSessionID(Sid),

    /// A request used a transport type that does not match the session's
    /// current transport (e.g. a POST on a websocket-only session).
    #[error("request transport does not match the session's current transport")]
    TransportMismatch,

    /// No `PONG` arrived within `ping_interval + ping_timeout`.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// A packet was structurally invalid for the context it was received in.
    #[error("bad packet received: {0:?}")]
    BadPacket(crate::packet::Packet),

    /// The packet framing itself could not be parsed.
    #[error("packet parsing error: {0}")]
    PacketParsing(#[from] crate::packet::PacketParseError),

    /// An error occurred building or sending an HTTP response.
    #[error("http error: {0}")]
    Http(#[from] http::Error),

    /// An HTTP request should be rejected with the given status and is not
    /// otherwise a server-side failure.
    #[error("http error response: {0}")]
    HttpErrorResponse(http::StatusCode),

    /// The egress queue for a session is full and cannot accept more packets.
    #[error("internal channel is full")]
    InternalChannelFull,

    /// The session has already been closed.
    #[error("session is closed")]
    SessionClosed,
}
