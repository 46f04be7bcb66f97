//! Realtime fan-out of chat frames over WebSocket.
//!
//! A [`Hub`] is a flat registry of open connections owned by the server
//! (one per [`crate::server::AppState`], so tests get their own). Any
//! well-formed JSON frame a client sends is re-serialized and forwarded to
//! every *other* open connection. There is no server-side filtering by
//! content item; clients filter on the `contentId` inside the frame.
//!
//! Connection lifecycle: `Connecting → Open → Closed`, where `Closed` is
//! terminal and the entry is dropped from the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

struct Connection {
    state: ConnectionState,
    outbox: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct Hub {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        // Each critical section is a single map operation, so poison is benign.
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a connection in the `Connecting` state. Frames relayed to it
    /// arrive on the returned receiver once it is [`mark_open`](Hub::mark_open).
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(
            id,
            Connection {
                state: ConnectionState::Connecting,
                outbox: tx,
            },
        );
        (id, rx)
    }

    pub fn mark_open(&self, id: ConnectionId) {
        if let Some(conn) = self.lock().get_mut(&id) {
            conn.state = ConnectionState::Open;
        }
    }

    pub fn unregister(&self, id: ConnectionId) {
        self.lock().remove(&id);
    }

    /// Current state; unknown ids are `Closed`.
    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.lock()
            .get(&id)
            .map(|c| c.state)
            .unwrap_or(ConnectionState::Closed)
    }

    pub fn open_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|c| c.state == ConnectionState::Open)
            .count()
    }

    /// Forward `frame` to every open connection except `from`.
    ///
    /// Returns how many connections it was queued for. A connection whose
    /// receiver is gone is dropped from the registry.
    pub fn relay(&self, from: ConnectionId, frame: &str) -> Result<usize, RelayError> {
        let value: serde_json::Value = serde_json::from_str(frame)?;
        let payload = serde_json::to_string(&value)?;

        let mut connections = self.lock();
        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, conn) in connections.iter() {
            if *id == from || conn.state != ConnectionState::Open {
                continue;
            }
            if conn.outbox.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            connections.remove(&id);
        }
        Ok(delivered)
    }
}

/// Drive one upgraded socket until either side closes.
pub async fn serve_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (id, mut outbox) = hub.register();
    let (mut sink, mut stream) = socket.split();
    hub.mark_open(id);
    tracing::info!(connection = id, open = hub.open_count(), "websocket connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_hub = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => match recv_hub.relay(id, text.as_str()) {
                    Ok(n) => tracing::debug!(connection = id, delivered = n, "relayed frame"),
                    Err(e) => tracing::warn!(connection = id, error = %e, "dropping frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(id);
    tracing::info!(connection = id, "websocket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_states() {
        let hub = Hub::new();
        let (id, _rx) = hub.register();
        assert_eq!(hub.state(id), ConnectionState::Connecting);
        hub.mark_open(id);
        assert_eq!(hub.state(id), ConnectionState::Open);
        hub.unregister(id);
        assert_eq!(hub.state(id), ConnectionState::Closed);
        hub.mark_open(id);
        assert_eq!(hub.state(id), ConnectionState::Closed);
    }

    #[test]
    fn relay_skips_sender_and_unopened() {
        let hub = Hub::new();
        let (a, mut rx_a) = hub.register();
        let (b, mut rx_b) = hub.register();
        let (_c, mut rx_c) = hub.register();
        hub.mark_open(a);
        hub.mark_open(b);

        let n = hub
            .relay(a, r#"{"type":"new_message","contentId":3,"message":{"text":"hi"}}"#)
            .unwrap();
        assert_eq!(n, 1);
        let got: serde_json::Value = serde_json::from_str(&rx_b.try_recv().unwrap()).unwrap();
        assert_eq!(got["contentId"], 3);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn malformed_frames_are_rejected() {
        let hub = Hub::new();
        let (a, _rx_a) = hub.register();
        let (b, mut rx_b) = hub.register();
        hub.mark_open(a);
        hub.mark_open(b);
        assert!(hub.relay(a, "not json").is_err());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.open_count(), 2);
    }

    #[test]
    fn dead_receivers_are_pruned() {
        let hub = Hub::new();
        let (a, _rx_a) = hub.register();
        let (b, rx_b) = hub.register();
        hub.mark_open(a);
        hub.mark_open(b);
        drop(rx_b);
        assert_eq!(hub.relay(a, "{}").unwrap(), 0);
        assert_eq!(hub.state(b), ConnectionState::Closed);
    }
}
