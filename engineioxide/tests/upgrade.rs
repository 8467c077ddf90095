mod fixture;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engineioxide::handler::EngineIoHandler;
use engineioxide::socket::{DisconnectReason, Socket};
use fixture::{create_polling_connection, send_req};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Default)]
struct CountingHandler {
    connects: Arc<AtomicUsize>,
}

impl EngineIoHandler for CountingHandler {
    type Data = ();

    fn on_connect(&self, _socket: Arc<Socket<()>>) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disconnect(&self, _socket: Arc<Socket<()>>, _reason: DisconnectReason) {}

    fn on_message(&self, msg: String, socket: Arc<Socket<()>>) {
        socket
            .emit(engineioxide::packet::Packet::Message(
                engineioxide::packet::MessageBody::Text(msg),
            ))
            .unwrap();
    }

    fn on_binary(&self, _data: Vec<u8>, _socket: Arc<Socket<()>>) {}
}

/// Spec §8 scenario 5: a polling session opens, then a websocket probes and
/// commits the upgrade; subsequent traffic for that session must ride the
/// websocket, and the original polling session must not be double-counted
/// as a second connection.
#[tokio::test]
async fn websocket_probe_commits_the_upgrade() {
    let handler = CountingHandler::default();
    fixture::create_server(handler.clone(), 3021);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sid = create_polling_connection(3021).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.connects.load(Ordering::SeqCst), 1);

    let (mut ws, _) = tokio_tungstenite::connect_async(format!(
        "ws://127.0.0.1:3021/engine.io/?EIO=4&transport=websocket&sid={sid}"
    ))
    .await
    .unwrap();

    ws.send(Message::Text("2probe".to_string())).await.unwrap();
    let pong = ws.next().await.unwrap().unwrap();
    assert_eq!(pong, Message::Text("3probe".to_string()));

    ws.send(Message::Text("5".to_string())).await.unwrap();

    // The probe/commit exchange must not have invoked on_connect again: this
    // is still the one session from the original polling handshake.
    assert_eq!(handler.connects.load(Ordering::SeqCst), 1);

    ws.send(Message::Text("4hello".to_string())).await.unwrap();
    let echoed = ws.next().await.unwrap().unwrap();
    assert_eq!(echoed, Message::Text("4hello".to_string()));
}

/// A websocket frame that isn't part of the probe/commit handshake (here, a
/// message sent before the `UPGRADE` packet) aborts the handshake rather
/// than silently treating it as committed traffic.
#[tokio::test]
async fn non_probe_traffic_before_commit_aborts_the_upgrade() {
    let handler = CountingHandler::default();
    fixture::create_server(handler.clone(), 3022);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sid = create_polling_connection(3022).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!(
        "ws://127.0.0.1:3022/engine.io/?EIO=4&transport=websocket&sid={sid}"
    ))
    .await
    .unwrap();

    ws.send(Message::Text("4too early".to_string()))
        .await
        .unwrap();

    let next = ws.next().await;
    assert!(next.is_none() || next.unwrap().is_err());

    // The original polling session is unaffected by the aborted upgrade
    // attempt; a regular poll still succeeds.
    let body = send_req(3022, format!("sid={sid}"), http::Method::GET, None).await;
    assert!(body.is_empty() || !body.contains("nknown"));
}
