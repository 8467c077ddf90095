//! The callback surface the application layer (socketioxide) implements to
//! receive engine.io lifecycle and message events.

use std::sync::Arc;

use crate::socket::{DisconnectReason, Socket};

/// Implemented by whatever sits above the engine layer (in this workspace,
/// `socketioxide::client::Client`) to receive raw engine.io events.
///
/// Every method is synchronous and must return quickly: it runs inline on
/// the session's reader task, so a slow implementation would stall that
/// session's heartbeat (spec §5). Implementations that need to do real work
/// should hand off to a `tokio::spawn`ed task.
pub trait EngineIoHandler: Clone + Send + Sync + 'static {
    /// Arbitrary per-session state the handler wants attached to each socket.
    type Data: Default + Send + Sync + 'static;

    /// Called once a new transport-level session has been established.
    fn on_connect(&self, socket: Arc<Socket<Self::Data>>);

    /// Called when the session is torn down, for any reason.
    fn on_disconnect(&self, socket: Arc<Socket<Self::Data>>, reason: DisconnectReason);

    /// Called for every textual `MESSAGE` packet received.
    fn on_message(&self, msg: String, socket: Arc<Socket<Self::Data>>);

    /// Called for every binary `MESSAGE` packet received (an attachment blob).
    fn on_binary(&self, data: Vec<u8>, socket: Arc<Socket<Self::Data>>);
}
