//! A transport-agnostic engine.io session (spec §3 "Engine session", §4.4).

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::errors::Error;
use crate::packet::{MessageBody, Packet};
use crate::sid::Sid;
use crate::transport::TransportType;

/// The reasons a session (and every namespace socket riding on it) can be
/// torn down, spec §7 class 3/4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client gracefully closed the connection.
    TransportClose,
    /// The client opened a second polling request while one was already in flight.
    MultipleHttpPollingError,
    /// A packet could not be parsed.
    PacketParsingError,
    /// The underlying transport failed (read/write error, abrupt close).
    TransportError,
    /// No `PONG` arrived within `ping_interval + ping_timeout`.
    HeartbeatTimeout,
    /// The server is shutting down.
    ClosingServer,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use DisconnectReason::*;
        let s = match self {
            TransportClose => "client gracefully closed the connection",
            MultipleHttpPollingError => "client had two concurrent polling requests in flight",
            PacketParsingError => "client sent a packet that could not be parsed",
            TransportError => "the underlying transport failed",
            HeartbeatTimeout => "client did not send a PONG packet in time",
            ClosingServer => "the server is shutting down",
        };
        f.write_str(s)
    }
}

const POLLING: u8 = 0;
const WEBSOCKET: u8 = 1;

/// A single engine.io session: the pairing of a `sid` with a transport, an
/// egress queue, and a liveness deadline.
pub struct Socket<D = ()> {
    pub id: Sid,
    pub data: D,
    pub req_parts: http::request::Parts,
    transport_type: AtomicU8,
    egress_tx: mpsc::Sender<Packet>,
    /// Exclusive handle used by the polling transport to drain the egress
    /// queue for a single in-flight GET. A second concurrent poll request
    /// fails to acquire the lock, which is how `MultipleHttpPollingError` is
    /// detected (spec §7).
    pub internal_rx: Mutex<mpsc::Receiver<Packet>>,
    pub(crate) heartbeat_tx: mpsc::Sender<()>,
    heartbeat_rx: Mutex<mpsc::Receiver<()>>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl<D: Debug> Debug for Socket<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("data", &self.data)
            .field("transport", &self.transport_type())
            .finish()
    }
}

impl<D: Default> Socket<D> {
    pub(crate) fn new(
        sid: Sid,
        transport: TransportType,
        req_parts: http::request::Parts,
        max_buffer_size: usize,
    ) -> Self {
        let (egress_tx, egress_rx) = mpsc::channel(max_buffer_size);
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(8);
        Self {
            id: sid,
            data: D::default(),
            req_parts,
            transport_type: AtomicU8::new(transport_tag(transport)),
            egress_tx,
            internal_rx: Mutex::new(egress_rx),
            heartbeat_tx,
            heartbeat_rx: Mutex::new(heartbeat_rx),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }
}

impl<D> Socket<D> {
    pub fn transport_type(&self) -> TransportType {
        match self.transport_type.load(Ordering::Acquire) {
            WEBSOCKET => TransportType::Websocket,
            _ => TransportType::Polling,
        }
    }

    pub fn is_http(&self) -> bool {
        self.transport_type() == TransportType::Polling
    }

    pub(crate) fn set_transport(&self, transport: TransportType) {
        self.transport_type
            .store(transport_tag(transport), Ordering::Release);
    }

    /// Enqueues a packet for delivery to the client.
    ///
    /// Non-blocking: returns [`Error::InternalChannelFull`] if the egress
    /// queue is saturated rather than waiting, so synchronous handler code
    /// (spec §4.6 `Emit`) never stalls.
    pub fn emit(&self, packet: Packet) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        self.egress_tx
            .try_send(packet)
            .map_err(|_| Error::InternalChannelFull)
    }

    pub fn emit_binary(&self, data: Vec<u8>) -> Result<(), Error> {
        self.emit(Packet::Message(MessageBody::Binary(Bytes::from(data))))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the session as closed and wakes anyone awaiting [`Socket::closed`].
    pub fn close(&self, _reason: DisconnectReason) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_notify.notify_waiters();
        }
    }

    /// Resolves once the session has been closed.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_notify.notified().await;
    }

    /// Called from the reader task whenever a `PONG` is received; resets the
    /// liveness deadline watched by [`Socket::spawn_heartbeat`].
    pub(crate) fn notify_pong(&self) {
        let _ = self.heartbeat_tx.try_send(());
    }

    /// Spawns the server-side heartbeat task (spec §4.4): sends `PING` every
    /// `interval`, and if no `PONG` arrives within `interval + timeout`
    /// closes the session with [`DisconnectReason::HeartbeatTimeout`].
    pub fn spawn_heartbeat(self: Arc<Self>, interval: Duration, timeout: Duration)
    where
        D: Send + Sync + 'static,
    {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if self.is_closed() {
                    break;
                }
                if self.emit(Packet::Ping(None)).is_err() {
                    break;
                }
                let mut rx = self.heartbeat_rx.lock().await;
                // Drain any stale pongs so we wait for a *fresh* one.
                while rx.try_recv().is_ok() {}
                let result = tokio::time::timeout(timeout, rx.recv()).await;
                drop(rx);
                match result {
                    Ok(Some(())) => continue,
                    _ => {
                        tracing::debug!("[sid={}] heartbeat timeout", self.id);
                        self.close(DisconnectReason::HeartbeatTimeout);
                        break;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
impl<D: Default> Socket<D> {
    /// A socket not attached to any real transport, for unit tests.
    pub fn new_dummy(sid: Sid) -> Self {
        let req = http::Request::builder().body(()).unwrap();
        Self::new(sid, TransportType::Polling, req.into_parts().0, 64)
    }
}

fn transport_tag(transport: TransportType) -> u8 {
    match transport {
        TransportType::Polling => POLLING,
        TransportType::Websocket => WEBSOCKET,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_fails_when_channel_full() {
        let socket: Socket<()> = Socket::new_dummy(Sid::new());
        for _ in 0..64 {
            socket.emit(Packet::Noop).unwrap();
        }
        assert!(matches!(
            socket.emit(Packet::Noop),
            Err(Error::InternalChannelFull)
        ));
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let socket: Arc<Socket<()>> = Arc::new(Socket::new_dummy(Sid::new()));
        let waiter = {
            let socket = socket.clone();
            tokio::spawn(async move {
                socket.closed().await;
            })
        };
        socket.close(DisconnectReason::TransportClose);
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("closed() should resolve promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn heartbeat_timeout_closes_session() {
        let socket: Arc<Socket<()>> = Arc::new(Socket::new_dummy(Sid::new()));
        socket
            .clone()
            .spawn_heartbeat(Duration::from_millis(10), Duration::from_millis(10));
        tokio::time::timeout(Duration::from_millis(200), socket.closed())
            .await
            .expect("session should die without a pong");
        assert!(socket.is_closed());
    }

    #[tokio::test]
    async fn pong_resets_heartbeat() {
        let socket: Arc<Socket<()>> = Arc::new(Socket::new_dummy(Sid::new()));
        socket
            .clone()
            .spawn_heartbeat(Duration::from_millis(20), Duration::from_millis(40));
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.notify_pong();
        }
        assert!(!socket.is_closed());
    }
}
