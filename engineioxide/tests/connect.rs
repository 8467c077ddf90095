mod fixture;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engineioxide::handler::EngineIoHandler;
use engineioxide::socket::{DisconnectReason, Socket};
use fixture::{create_polling_connection, create_ws_connection, send_req};
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
        socket.emit(engineioxide::packet::Packet::Message(
            engineioxide::packet::MessageBody::Text(msg),
        ))
        .unwrap();
    }

    fn on_binary(&self, _data: Vec<u8>, _socket: Arc<Socket<()>>) {}
}

#[tokio::test]
async fn polling_handshake_creates_a_session() {
    let handler = CountingHandler::default();
    fixture::create_server(handler.clone(), 3011);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sid = create_polling_connection(3011).await;
    assert!(!sid.is_empty());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn websocket_handshake_creates_a_session() {
    let handler = CountingHandler::default();
    fixture::create_server(handler.clone(), 3012);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = create_ws_connection(3012).await;
    let open = ws.next().await.unwrap().unwrap();
    assert!(matches!(open, Message::Text(ref t) if t.starts_with('0')));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn websocket_echoes_messages_sent_by_the_handler() {
    let handler = CountingHandler::default();
    fixture::create_server(handler, 3013);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = create_ws_connection(3013).await;
    let _open = ws.next().await.unwrap().unwrap();
    ws.send(Message::Text("4hello".to_string())).await.unwrap();

    let echoed = ws.next().await.unwrap().unwrap();
    assert_eq!(echoed, Message::Text("4hello".to_string()));
}

#[tokio::test]
async fn post_with_unknown_sid_is_rejected() {
    let handler = CountingHandler::default();
    fixture::create_server(handler, 3014);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let body = send_req(
        3014,
        "transport=polling&sid=aaaaaaaaaaaaaaaaaaaa".to_string(),
        http::Method::POST,
        Some("1:4x".to_string()),
    )
    .await;
    assert!(body.is_empty() || body.contains("nknown"));
}
