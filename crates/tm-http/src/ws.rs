//! `/ws` — fans out Change Bus events to subscribers.
//!
//! Each socket gets its own bounded `mpsc` queue: a feeder task drains the
//! broadcast channel into the queue so a slow socket write never stalls the
//! broadcast receiver itself; when the feeder falls behind far enough for
//! the broadcast channel to report `Lagged`, a `resync_required` event is
//! queued once instead of silently dropping the gap.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::state::AppState;

const QUEUE_CAPACITY: usize = 256;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle(socket, state))
}

async fn handle(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(QUEUE_CAPACITY);

    let mut broadcast_rx = state.watcher.subscribe();
    let feeder = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if tx.send(text).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => {
                    let resync = serde_json::json!({ "kind": "resync_required" }).to_string();
                    if tx.send(resync).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // The client never sends meaningful frames; drain to notice disconnects.
    while stream.next().await.is_some() {}

    feeder.abort();
    writer.abort();
}
