//! Canal push `/ws/dashboard`.
//!
//! Protocolo cliente -> servidor: `{"action":"subscribe","call_id":"..."}` o
//! `{"action":"ping"}`. Servidor -> cliente: `{"type":"subscribed",...}`,
//! `{"type":"pong"}` y los eventos `call_update` que el hub publica. Los
//! frames desconocidos se ignoran; una desconexión da de baja al peer
//! limpiamente.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::notify::{NotificationHub, PeerId};

pub async fn dashboard(State(ctx): State<Arc<AppContext>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: Arc<AppContext>) {
    let (peer, mut events) = ctx.hub.attach();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // El hub cerró el canal (peer dado de baja en un publish).
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_frame(&ctx.hub, peer, &text) {
                            if sink.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(peer, "websocket client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {} // frames binarios/ping de protocolo: ignorar
                    Some(Err(e)) => {
                        warn!(peer, "websocket error: {e}");
                        break;
                    }
                }
            }
        }
    }

    ctx.hub.detach(peer);
}

/// Procesa un frame de texto del cliente y devuelve la respuesta directa, si
/// corresponde. Separado del socket para poder testearlo sin red.
fn handle_client_frame(hub: &NotificationHub, peer: PeerId, text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    match value.get("action").and_then(|a| a.as_str()) {
        Some("subscribe") => {
            let call_id = value.get("call_id").and_then(|c| c.as_str())?;
            hub.subscribe(peer, call_id);
            Some(serde_json::json!({"type": "subscribed", "call_id": call_id}).to_string())
        }
        Some("ping") => Some(serde_json::json!({"type": "pong"}).to_string()),
        _ => None,
    }
}
