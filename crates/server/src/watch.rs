//! WebSocket live feeds over the block sync tracker.
//!
//! Each connection gets its own subscription; the subscription detaches itself
//! when the handler returns, whichever way the connection ends. A consumer the
//! registry dropped for falling behind observes end-of-stream and is closed.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use litegate_core::sync::Subscription;
use std::sync::Arc;
use tracing::debug;

use crate::router::AppState;

/// `GET /block/watch`: the current snapshot immediately, then every change.
pub async fn handle_block_watch(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let block_sync = Arc::clone(&state.block_sync);
    ws.on_upgrade(move |socket| async move {
        let subscription = block_sync.subscribe();
        stream_heads(socket, subscription).await;
    })
}

/// `GET /block/watch/changed`: change events only, no initial snapshot.
pub async fn handle_block_watch_changed(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let block_sync = Arc::clone(&state.block_sync);
    ws.on_upgrade(move |socket| async move {
        let subscription = block_sync.subscribe_changes();
        stream_heads(socket, subscription).await;
    })
}

/// Pumps head events onto the socket until either side goes away.
async fn stream_heads(mut socket: WebSocket, mut subscription: Subscription) {
    debug!(subscriber = subscription.id(), "websocket feed attached");

    loop {
        tokio::select! {
            head = subscription.recv() => {
                // None means the registry dropped us (consumer too slow).
                let Some(head) = head else { break };
                let Ok(text) = serde_json::to_string(&*head) else { break };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    // Pings are answered by axum; other client frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(subscriber = subscription.id(), "websocket feed detached");
}
