// Push channel: every accepted tick as JSON over a WebSocket

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::AppState;
use crate::service::TradingService;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.service))
}

async fn handle_socket(socket: WebSocket, service: TradingService) {
    let mut subscription = service.subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!(subscriber = %subscription.id(), "WebSocket client connected");

    loop {
        tokio::select! {
            tick = subscription.recv() => {
                let Some(tick) = tick else { break };
                let text = match serde_json::to_string(&tick) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Could not encode tick");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(message)) => debug!(?message, "Ignoring client message"),
            },
        }
    }

    // Dropping the subscription detaches it from the hub
    info!(subscriber = %subscription.id(), "WebSocket client disconnected");
}
