//! The polling transport: handles the handshake GET, the long-poll GET, and
//! the data POST (spec §4.3, §4.5, §6).

mod payload;

use std::sync::Arc;

use futures_util::StreamExt;
use http::{Request, Response, StatusCode};

use crate::body::ResponseBody;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::futures::http_response;
use crate::handler::EngineIoHandler;
use crate::packet::{OpenPacket, Packet};
use crate::sid::Sid;
use crate::socket::DisconnectReason;
use crate::transport::polling::payload::Payload;

use super::TransportType;

/// Handles the handshake `GET .../?EIO=4&transport=polling` request: creates
/// a session, starts its heartbeat task, and replies with the `OPEN` packet.
pub fn open_req<H, B, R>(
    engine: Arc<EngineIo<H>>,
    req: Request<R>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
    B: Send + 'static,
{
    let req_parts = req.into_parts().0;
    let socket = engine.create_session(TransportType::Polling, req_parts);
    socket
        .clone()
        .spawn_heartbeat(engine.config.ping_interval, engine.config.ping_timeout);

    let packet = OpenPacket::new(TransportType::Polling, socket.id, &engine.config);
    engine.handler.on_connect(socket);

    let packet: String = Packet::Open(packet).into();
    http_response(StatusCode::OK, packet, false).map_err(Error::Http)
}

/// Handles the long-poll `GET`: blocks until at least one packet is queued
/// for the session, then frames everything currently available into one
/// response body.
pub async fn polling_req<B, H>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
) -> Result<Response<ResponseBody<B>>, Error>
where
    B: Send + 'static,
    H: EngineIoHandler,
{
    let socket = engine.get_socket(sid).ok_or(Error::UnknownSessionID(sid))?;
    if !socket.is_http() {
        return Err(Error::TransportMismatch);
    }

    let rx = match socket.internal_rx.try_lock() {
        Ok(rx) => rx,
        Err(_) => {
            engine.close_session(sid, DisconnectReason::MultipleHttpPollingError);
            return Err(Error::HttpErrorResponse(StatusCode::BAD_REQUEST));
        }
    };

    tracing::debug!("[sid={sid}] polling request");
    let Payload { data, has_binary } = payload::encoder(rx, engine.config.max_payload).await?;
    tracing::debug!("[sid={sid}] sending {} bytes", data.len());
    Ok(http_response(StatusCode::OK, data, has_binary)?)
}

/// Handles the `POST` carrying one or more client packets.
pub async fn post_req<R, B, H>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
    body: Request<R>,
) -> Result<Response<ResponseBody<B>>, Error>
where
    H: EngineIoHandler,
    R: http_body::Body + Send + Unpin + 'static,
    R::Error: std::fmt::Debug,
    B: Send + 'static,
{
    let socket = engine.get_socket(sid).ok_or(Error::UnknownSessionID(sid))?;
    if !socket.is_http() {
        return Err(Error::TransportMismatch);
    }

    let max_payload = engine.config.max_payload;
    let stream = payload::decoder(body, max_payload).await;
    futures_util::pin_mut!(stream);

    while let Some(packet) = stream.next().await {
        match packet {
            Ok(Packet::Close) => {
                tracing::debug!("[sid={sid}] closing session");
                socket.emit(Packet::Noop)?;
                engine.close_session(sid, DisconnectReason::TransportClose);
                break;
            }
            Ok(Packet::Pong(_)) => socket.notify_pong(),
            Ok(Packet::Ping(_)) => {}
            Ok(Packet::Message(crate::packet::MessageBody::Text(msg))) => {
                engine.handler.on_message(msg, socket.clone())
            }
            Ok(Packet::Message(crate::packet::MessageBody::Binary(bin))) => {
                engine.handler.on_binary(bin.to_vec(), socket.clone())
            }
            Ok(p) => {
                tracing::debug!("[sid={sid}] bad packet received: {:?}", &p);
                return Err(Error::BadPacket(p));
            }
            Err(e) => {
                tracing::debug!("[sid={sid}] error parsing packet: {:?}", e);
                engine.close_session(sid, DisconnectReason::PacketParsingError);
                return Err(Error::PacketParsing(e));
            }
        }
    }
    Ok(http_response(StatusCode::OK, "ok", false)?)
}
