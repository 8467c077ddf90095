//! The per-socket acknowledgement table (spec §3 "Ack table", §4.6).

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::errors::AckError;
use crate::value::Value;

/// One socket's outbound acks: a monotonically increasing id generator plus
/// a map of ids awaiting a reply (spec §3 "Ack table").
#[derive(Debug, Default)]
pub struct AckTable {
    counter: AtomicI64,
    pending: Mutex<HashMap<i64, oneshot::Sender<Value>>>,
}

impl AckTable {
    /// Reserves the next ack id and registers a receiver for its reply.
    pub fn register(&self) -> (i64, oneshot::Receiver<Value>) {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    /// Resolves a pending ack with the data carried by the ACK packet.
    /// A reply for an unknown id is silently ignored (spec §7 class 2:
    /// "ACK for unknown id" is a protocol error surfaced via `OnError`, not
    /// a reason to kill the socket).
    pub fn resolve(&self, id: i64, data: Value) -> bool {
        if let Some(tx) = self.pending.lock().unwrap().remove(&id) {
            let _ = tx.send(data);
            true
        } else {
            false
        }
    }

    /// Fails every outstanding ack, for socket disconnection (spec §4.6).
    pub fn cancel_all(&self) {
        for (_, tx) in self.pending.lock().unwrap().drain() {
            drop(tx);
        }
    }
}

/// A single ack reply, deserialized into the caller's expected type.
#[derive(Debug, Clone)]
pub struct AckResponse<V> {
    pub data: V,
}

/// Waits for one socket's ack with a bound on how long to wait, used by
/// `Socket::emit_with_ack` (spec §4.6: "Timeouts are not built in; callers
/// may implement them around Emit" — the timeout bound is threaded through
/// explicitly by the caller rather than assumed).
pub async fn wait_for_ack(
    rx: oneshot::Receiver<Value>,
    timeout: Duration,
) -> Result<Value, AckError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(AckError::Closed),
        Err(_) => Err(AckError::Timeout),
    }
}

/// A stream of ack replies from every socket a broadcast emit targeted
/// (spec §4.7 `BroadcastTo`): each item resolves independently as that
/// socket's ack arrives or times out.
pub struct AckStream {
    rx: mpsc::UnboundedReceiver<Result<Value, AckError>>,
}

impl AckStream {
    pub fn new(rx: mpsc::UnboundedReceiver<Result<Value, AckError>>) -> Self {
        Self { rx }
    }
}

impl Stream for AckStream {
    type Item = Result<Value, AckError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_a_registered_ack() {
        let table = AckTable::default();
        let (id, rx) = table.register();
        assert!(table.resolve(id, Value::Null));
        let value = wait_for_ack(rx, Duration::from_millis(50)).await.unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn resolving_an_unknown_id_is_a_no_op() {
        let table = AckTable::default();
        assert!(!table.resolve(999, Value::Null));
    }

    #[tokio::test]
    async fn times_out_if_no_ack_arrives() {
        let table = AckTable::default();
        let (_id, rx) = table.register();
        let result = wait_for_ack(rx, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(AckError::Timeout)));
    }

    #[tokio::test]
    async fn cancel_all_fails_outstanding_acks() {
        let table = AckTable::default();
        let (_id, rx) = table.register();
        table.cancel_all();
        let result = wait_for_ack(rx, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(AckError::Closed)));
    }
}
