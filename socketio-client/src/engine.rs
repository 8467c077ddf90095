//! The client-side engine.io session: websocket dial, handshake, heartbeat
//! reply, and the reconnect state machine. Grounded on the `rust-socketio`
//! family's asynchronous engine.io client, reworked onto this workspace's
//! own packet types and onto a single `tokio::sync::Notify`-driven
//! reconnect loop instead of a recursive retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use engineioxide::packet::{MessageBody, Packet as EnginePacket};
use engineioxide::Sid;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::config::ClientConfig;
use crate::errors::Error;

/// Why a client-side engine.io session stopped carrying traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// [`EngineSocket::disconnect`] was called.
    ClientDisconnect,
    /// The server sent a `CLOSE` packet or closed the websocket gracefully.
    TransportClose,
    /// The websocket read or write failed.
    TransportError,
}

/// The hooks the transport layer calls as frames arrive, mirroring the
/// server-side `EngineIoHandler` contract for the other end of the wire:
/// rather than the handler holding a reference to its connection, each
/// callback is handed the live `Arc<EngineSocket<Self>>` it arrived on.
pub trait EngineClientHandler: Send + Sync + 'static {
    fn on_open(&self, engine: &Arc<EngineSocket<Self>>, sid: Sid)
    where
        Self: Sized;
    fn on_message(&self, engine: &Arc<EngineSocket<Self>>, text: String)
    where
        Self: Sized;
    fn on_binary(&self, engine: &Arc<EngineSocket<Self>>, data: Vec<u8>)
    where
        Self: Sized;
    fn on_close(&self, engine: &Arc<EngineSocket<Self>>, reason: DisconnectReason)
    where
        Self: Sized;
}

enum ConnState {
    Connected,
    Reconnecting,
    Closed,
}

struct Shared {
    sid: Mutex<Option<Sid>>,
    egress_tx: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    state: Mutex<ConnState>,
    closing: AtomicBool,
    notify: Notify,
}

/// A client-side engine.io connection: one websocket, its reader/writer
/// tasks, and the reconnect loop that replaces it after it dies.
pub struct EngineSocket<H: EngineClientHandler> {
    url: Url,
    config: ClientConfig,
    handler: Arc<H>,
    shared: Shared,
}

impl<H: EngineClientHandler> EngineSocket<H> {
    /// Dials `url` and blocks until the `OPEN` handshake completes.
    pub async fn connect(url: Url, config: ClientConfig, handler: Arc<H>) -> Result<Arc<Self>, Error> {
        let shared = Shared {
            sid: Mutex::new(None),
            egress_tx: Mutex::new(None),
            state: Mutex::new(ConnState::Reconnecting),
            closing: AtomicBool::new(false),
            notify: Notify::new(),
        };
        let socket = Arc::new(Self {
            url,
            config,
            handler,
            shared,
        });
        socket.clone().dial().await?;
        Ok(socket)
    }

    pub fn sid(&self) -> Option<Sid> {
        *self.shared.sid.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.shared.state.lock().unwrap(), ConnState::Connected)
    }

    /// Enqueues a text frame (a socket.io application header) for delivery.
    pub fn emit_text(&self, text: String) -> Result<(), Error> {
        self.send_frame(WsMessage::Text(text))
    }

    /// Enqueues a raw binary attachment frame for delivery.
    pub fn emit_binary(&self, data: Vec<u8>) -> Result<(), Error> {
        self.send_frame(WsMessage::Binary(data))
    }

    fn send_frame(&self, frame: WsMessage) -> Result<(), Error> {
        match self.shared.egress_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| Error::Closed),
            None => Err(Error::Closed),
        }
    }

    /// Sends an engine.io `CLOSE` and permanently tears the session down;
    /// no reconnect follows (spec's client `.close()` is observable
    /// immediately rather than waiting on the in-flight reconnect sleep).
    pub fn disconnect(&self) {
        self.shared.closing.store(true, Ordering::Release);
        let _ = self.send_frame(WsMessage::Text(String::from(EnginePacket::Close)));
        *self.shared.state.lock().unwrap() = ConnState::Closed;
        self.shared.notify.notify_waiters();
    }

    /// Resolves once the session has been permanently closed (will not
    /// reconnect again).
    pub async fn closed(&self) {
        loop {
            if matches!(*self.shared.state.lock().unwrap(), ConnState::Closed) {
                return;
            }
            self.shared.notify.notified().await;
        }
    }

    async fn dial(self: Arc<Self>) -> Result<(), Error> {
        let handshake_url = websocket_url(&self.url)?;
        let (ws, _response) = tokio_tungstenite::connect_async(handshake_url.as_str()).await?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let open = match ws_rx.next().await {
            Some(Ok(WsMessage::Text(text))) => match EnginePacket::try_from(text)? {
                EnginePacket::Open(open) => open,
                other => {
                    return Err(Error::Handshake(format!("expected an OPEN packet, got {other:?}")))
                }
            },
            Some(Ok(_)) => return Err(Error::Handshake("expected a text OPEN frame".into())),
            Some(Err(err)) => return Err(err.into()),
            None => return Err(Error::Handshake("connection closed before handshake".into())),
        };

        *self.shared.sid.lock().unwrap() = Some(open.sid);
        *self.shared.state.lock().unwrap() = ConnState::Connected;
        self.shared.closing.store(false, Ordering::Release);

        let (egress_tx, mut egress_rx) = mpsc::unbounded_channel();
        *self.shared.egress_tx.lock().unwrap() = Some(egress_tx);

        let writer = tokio::spawn(async move {
            while let Some(frame) = egress_rx.recv().await {
                if ws_tx.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        self.handler.on_open(&self, open.sid);

        let reader_self = self.clone();
        tokio::spawn(async move {
            let mut reason = DisconnectReason::TransportClose;
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match EnginePacket::try_from(text) {
                        Ok(EnginePacket::Ping(_)) => {
                            let _ = reader_self.send_frame(WsMessage::Text(String::from(
                                EnginePacket::Pong(None),
                            )));
                        }
                        Ok(EnginePacket::Close) => break,
                        Ok(EnginePacket::Message(MessageBody::Text(text))) => {
                            reader_self.handler.on_message(&reader_self, text)
                        }
                        Ok(_) => {}
                        Err(_) => {
                            reason = DisconnectReason::TransportError;
                            break;
                        }
                    },
                    Ok(WsMessage::Binary(data)) => {
                        reader_self.handler.on_binary(&reader_self, data)
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => {
                        reason = DisconnectReason::TransportError;
                        break;
                    }
                }
            }
            writer.abort();
            reader_self.on_transport_down(reason);
        });

        Ok(())
    }

    fn on_transport_down(self: Arc<Self>, reason: DisconnectReason) {
        *self.shared.egress_tx.lock().unwrap() = None;
        if self.shared.closing.load(Ordering::Acquire) {
            *self.shared.state.lock().unwrap() = ConnState::Closed;
            self.shared.notify.notify_waiters();
            self.handler.on_close(&self, DisconnectReason::ClientDisconnect);
            return;
        }
        self.handler.on_close(&self, reason);
        if !self.config.reconnection {
            *self.shared.state.lock().unwrap() = ConnState::Closed;
            self.shared.notify.notify_waiters();
            return;
        }
        *self.shared.state.lock().unwrap() = ConnState::Reconnecting;
        tokio::spawn(async move { self.reconnect_loop().await });
    }

    async fn reconnect_loop(self: Arc<Self>) {
        let mut attempt: u32 = 0;
        loop {
            if self.shared.closing.load(Ordering::Acquire) {
                return;
            }
            if let Some(max) = self.config.reconnect_max_attempts {
                if attempt >= max {
                    *self.shared.state.lock().unwrap() = ConnState::Closed;
                    self.shared.notify.notify_waiters();
                    return;
                }
            }
            let delay = backoff_delay(&self.config, attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shared.notify.notified() => return,
            }
            if self.shared.closing.load(Ordering::Acquire) {
                return;
            }
            match self.clone().dial().await {
                Ok(()) => return,
                Err(err) => {
                    tracing::debug!("reconnect attempt {attempt} failed: {err}");
                    attempt += 1;
                }
            }
        }
    }
}

/// `base * 2^attempt`, capped at `reconnect_max_delay`.
fn capped_delay_ms(config: &ClientConfig, attempt: u32) -> u64 {
    let base = config.reconnect_min_delay.as_millis() as u64;
    let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    let raw = base.saturating_mul(factor);
    raw.min(config.reconnect_max_delay.as_millis() as u64).max(1)
}

/// The capped exponential delay, jittered down by up to a quarter of its
/// value so a reconnect storm doesn't retry in lockstep.
fn backoff_delay(config: &ClientConfig, attempt: u32) -> Duration {
    let capped = capped_delay_ms(config, attempt);
    let jitter_bound = (capped / 4).max(1);
    let jitter = rand::Rng::gen_range(&mut rand::thread_rng(), 0..=jitter_bound);
    Duration::from_millis(capped.saturating_sub(jitter))
}

fn websocket_url(url: &Url) -> Result<Url, Error> {
    let mut url = url.clone();
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| Error::Handshake("url has no authority for a scheme change".into()))?;
    url.query_pairs_mut()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_delay_grows_monotonically_until_the_cap() {
        let config = ClientConfig {
            reconnect_min_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_millis(1_000),
            ..ClientConfig::default()
        };
        let mut last = 0;
        for attempt in 0..6 {
            let delay = capped_delay_ms(&config, attempt);
            assert!(delay >= last);
            last = delay;
        }
        assert_eq!(last, 1_000);
    }

    #[test]
    fn backoff_never_exceeds_the_configured_cap() {
        let config = ClientConfig {
            reconnect_min_delay: Duration::from_millis(200),
            reconnect_max_delay: Duration::from_millis(800),
            ..ClientConfig::default()
        };
        for attempt in 0..20 {
            assert!(backoff_delay(&config, attempt) <= config.reconnect_max_delay);
        }
    }

    #[test]
    fn websocket_url_rewrites_scheme_and_appends_query() {
        let url = Url::parse("http://localhost:3000/socket.io/").unwrap();
        let ws = websocket_url(&url).unwrap();
        assert_eq!(ws.scheme(), "ws");
        assert!(ws.query().unwrap().contains("EIO=4"));
        assert!(ws.query().unwrap().contains("transport=websocket"));
    }

    #[test]
    fn https_becomes_wss() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(websocket_url(&url).unwrap().scheme(), "wss");
    }
}
