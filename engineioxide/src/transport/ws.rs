//! The websocket transport: a full-duplex upgrade, read loop, and write pump
//! per session (spec §4.3, §4.5).

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use crate::body::ResponseBody;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::handler::EngineIoHandler;
use crate::packet::{MessageBody, Packet};
use crate::sid::Sid;
use crate::socket::DisconnectReason;

/// Completes the HTTP-to-websocket upgrade handshake and hands the resulting
/// stream off to [`handle_socket`] in a spawned task (spec §4.3: a direct
/// websocket connection, or a polling session upgrading in place).
///
/// Returns the `101 Switching Protocols` response immediately; the actual
/// engine.io traffic is driven by the spawned task once `hyper` completes
/// the upgrade on its end.
pub async fn upgrade<H, ReqBody, ResBody>(
    engine: Arc<EngineIo<H>>,
    mut req: Request<ReqBody>,
    sid: Option<Sid>,
) -> Result<Response<ResponseBody<ResBody>>, Error>
where
    H: EngineIoHandler,
    ReqBody: http_body::Body + Send + Unpin + 'static,
    ResBody: Send + 'static,
{
    let key = req
        .headers()
        .get(http::header::SEC_WEBSOCKET_KEY)
        .cloned()
        .ok_or(Error::HttpErrorResponse(StatusCode::BAD_REQUEST))?;
    let accept = derive_accept_key(key.as_bytes());

    if let Some(sid) = sid {
        if engine.get_socket(sid).is_none() {
            return Err(Error::UnknownSessionID(sid));
        }
    }

    let on_upgrade = hyper::upgrade::on(&mut req);
    let (req_parts, _) = req.into_parts();

    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let io = TokioIo::new(upgraded);
                let ws = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
                handle_socket(engine, ws, sid, req_parts).await;
            }
            Err(err) => tracing::debug!("websocket upgrade failed: {err}"),
        }
    });

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(http::header::CONNECTION, "Upgrade")
        .header(http::header::UPGRADE, "websocket")
        .header(http::header::SEC_WEBSOCKET_ACCEPT, accept)
        .body(ResponseBody::engine(Bytes::new()))
        .map_err(Error::Http)
}

/// Drives a single websocket connection for an existing or brand-new
/// session: spawns a writer task that drains the session's egress queue and
/// runs the reader loop inline until the socket closes or errors.
///
/// `sid` is `None` for a direct websocket connection (no prior polling
/// handshake); in that case a fresh session is created and its `OPEN`
/// packet is sent as the first websocket frame, mirroring the handshake a
/// polling client gets over HTTP (spec §4.3).
pub async fn handle_socket<H, S>(
    engine: Arc<EngineIo<H>>,
    ws: WebSocketStream<S>,
    sid: Option<Sid>,
    req_parts: http::request::Parts,
) where
    H: EngineIoHandler,
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    use crate::transport::TransportType;

    let (mut ws_tx, mut ws_rx) = ws.split();

    let is_upgrade = sid.is_some();
    let socket = match sid {
        Some(sid) => match engine.get_socket(sid) {
            // The transport switch itself (spec §4.4 "the server flushes
            // pending writes on the old transport, then switches") happens
            // only once the probe/`UPGRADE` handshake below completes, not
            // at the moment the websocket connects.
            Some(socket) => socket,
            None => return,
        },
        None => {
            let socket = engine.create_session(TransportType::Websocket, req_parts);
            let open = crate::packet::OpenPacket::new(
                TransportType::Websocket,
                socket.id,
                &engine.config,
            );
            let open_frame: String = Packet::Open(open).into();
            if ws_tx.send(WsMessage::Text(open_frame)).await.is_err() {
                engine.close_session(socket.id, DisconnectReason::TransportError);
                return;
            }
            socket
                .clone()
                .spawn_heartbeat(engine.config.ping_interval, engine.config.ping_timeout);
            engine.handler.on_connect(socket.clone());
            socket
        }
    };

    let sid = socket.id;

    if is_upgrade && !probe_and_commit(&mut ws_tx, &mut ws_rx, &socket).await {
        // The probe never committed: this websocket attempt is abandoned,
        // but the session's existing (polling) transport is untouched.
        let _ = ws_tx.close().await;
        return;
    }

    let (close_tx, mut close_rx) = mpsc::channel::<()>(1);

    let writer_socket = socket.clone();
    let writer = tokio::spawn(async move {
        let mut rx = writer_socket.internal_rx.lock().await;
        loop {
            tokio::select! {
                packet = rx.recv() => {
                    let Some(packet) = packet else { break };
                    let frame = if packet.is_binary() {
                        WsMessage::Binary(bytes::Bytes::from(packet).to_vec())
                    } else {
                        WsMessage::Text(String::from(packet))
                    };
                    if ws_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                _ = close_rx.recv() => break,
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(_) => {
                engine.close_session(sid, DisconnectReason::TransportError);
                break;
            }
        };
        match msg {
            WsMessage::Text(text) => match Packet::try_from(text) {
                Ok(Packet::Close) => {
                    engine.close_session(sid, DisconnectReason::TransportClose);
                    break;
                }
                Ok(Packet::Pong(_)) => socket.notify_pong(),
                Ok(Packet::Ping(_)) => {}
                Ok(Packet::Message(MessageBody::Text(text))) => {
                    engine.handler.on_message(text, socket.clone())
                }
                Ok(_) => {}
                Err(_) => {
                    engine.close_session(sid, DisconnectReason::PacketParsingError);
                    break;
                }
            },
            WsMessage::Binary(data) => {
                engine.handler.on_binary(data, socket.clone());
            }
            WsMessage::Close(_) => {
                engine.close_session(sid, DisconnectReason::TransportClose);
                break;
            }
            _ => {}
        }
    }

    let _ = close_tx.send(()).await;
    let _ = writer.await;
    if !socket.is_closed() {
        engine.close_session(sid, DisconnectReason::TransportError);
    }
}

/// Drives the upgrade probe handshake for a websocket opened against an
/// already-established (polling) session (spec §4.4): replies to the
/// client's `PING "probe"` with a `PONG "probe"` on this transport, then
/// waits for the `UPGRADE` packet that commits the switch. Only once that
/// arrives does the session's primary transport actually flip, so any
/// concurrent long-poll GET keeps draining the egress queue right up to the
/// commit point. Returns `false` on any frame that isn't part of this
/// handshake, or if the connection drops first.
async fn probe_and_commit<S, D>(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocketStream<S>, WsMessage>,
    ws_rx: &mut futures_util::stream::SplitStream<WebSocketStream<S>>,
    socket: &crate::socket::Socket<D>,
) -> bool
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    const PROBE: &[u8] = b"probe";
    loop {
        let msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            _ => return false,
        };
        let text = match msg {
            WsMessage::Text(text) => text,
            _ => return false,
        };
        match Packet::try_from(text) {
            Ok(Packet::Ping(Some(body))) if body.as_ref() == PROBE => {
                let pong = Packet::Pong(Some(Bytes::from_static(PROBE)));
                if ws_tx.send(WsMessage::Text(String::from(pong))).await.is_err() {
                    return false;
                }
            }
            Ok(Packet::Upgrade) => {
                socket.set_transport(crate::transport::TransportType::Websocket);
                return true;
            }
            _ => return false,
        }
    }
}
