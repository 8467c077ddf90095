mod fixture;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engineioxide::handler::EngineIoHandler;
use engineioxide::socket::{DisconnectReason, Socket};
use fixture::create_ws_connection;
use futures_util::StreamExt;

#[derive(Debug, Clone, Default)]
struct RecordingHandler {
    disconnects: Arc<AtomicUsize>,
    last_reason: Arc<std::sync::Mutex<Option<DisconnectReason>>>,
}

impl EngineIoHandler for RecordingHandler {
    type Data = ();

    fn on_connect(&self, _socket: Arc<Socket<()>>) {}

    fn on_disconnect(&self, _socket: Arc<Socket<()>>, reason: DisconnectReason) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.last_reason.lock().unwrap() = Some(reason);
    }

    fn on_message(&self, _msg: String, _socket: Arc<Socket<()>>) {}

    fn on_binary(&self, _data: Vec<u8>, _socket: Arc<Socket<()>>) {}
}

/// A client that never replies to `PING` must be dropped once
/// `ping_interval + ping_timeout` elapses (spec §4.4, §7).
#[tokio::test]
async fn silent_client_is_disconnected_after_heartbeat_timeout() {
    let handler = RecordingHandler::default();
    fixture::create_server(handler.clone(), 3021);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = create_ws_connection(3021).await;
    let _open = ws.next().await.unwrap().unwrap();

    // fixture server is configured with a 300ms ping interval / 200ms timeout;
    // never answer the PING and wait past the deadline.
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(handler.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(
        *handler.last_reason.lock().unwrap(),
        Some(DisconnectReason::HeartbeatTimeout)
    );
}
