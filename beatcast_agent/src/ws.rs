//! WebSocket upgrade and per-connection handler. Forwards scheduled deliveries.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::subscription::{SubscriberId, SubscriptionManager};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, mut deliveries) = state.subscriptions.connect();

    // Ensure we disconnect exactly once, however the loop exits.
    struct SubscriberGuard(Arc<SubscriptionManager>, SubscriberId);
    impl Drop for SubscriberGuard {
        fn drop(&mut self) {
            self.0.disconnect(self.1);
        }
    }
    let _guard = SubscriberGuard(Arc::clone(&state.subscriptions), id);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            delivery = deliveries.recv() => {
                let Some(delivery) = delivery else { break };
                if sink.send(Message::Text(delivery.to_frame())).await.is_err() {
                    break;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
}
