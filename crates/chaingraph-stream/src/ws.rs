//! axum wiring for the duplex WebSocket endpoint (spec §4.F, §6 `/ws`).
//!
//! One task owns the socket: it reads client frames directly and selects
//! on the connection's outbox/eviction signal to write server frames,
//! keeping a single writer so send order is preserved without an extra
//! mutex around the `SplitSink`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

use crate::protocol::{ClientFrame, ServerFrame};
use crate::registry::Registry;

#[derive(Clone)]
pub struct StreamState {
    pub registry: Arc<Registry>,
    pub outbox_buffer_size: usize,
}

pub fn router(state: StreamState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(upgrade))
        .with_state(state)
        .layer(crate::middleware::cors_layer())
        .layer(crate::middleware::logging_layer())
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<StreamState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: StreamState) {
    let conn = match state.registry.connect(state.outbox_buffer_size) {
        Ok(conn) => conn,
        Err(max) => {
            tracing::warn!(max_connections = max, "rejecting connection, pool at capacity");
            let (mut sender, _) = socket.split();
            let frame = ServerFrame::Error { error: format!("connection pool at capacity ({max})") };
            let _ = send_frame(&mut sender, &frame).await;
            return;
        }
    };
    let client_id = conn.client_id.clone();
    let registry = state.registry.clone();

    let (mut sender, mut receiver) = socket.split();
    let mut outbox_rx = conn.outbox_rx;
    let evict = conn.evict;

    if send_frame(&mut sender, &ServerFrame::Connected { client_id: client_id.clone() }).await.is_err() {
        registry.disconnect(&client_id);
        return;
    }

    loop {
        tokio::select! {
            biased;

            _ = evict.notified() => {
                let _ = send_frame(&mut sender, &ServerFrame::Error { error: "slow consumer".to_string() }).await;
                break;
            }
            outgoing = outbox_rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        if send_frame(&mut sender, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        registry.record_activity(&client_id);
                        handle_client_frame(&registry, &client_id, &mut sender, &text).await;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        registry.record_activity(&client_id);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        let _ = send_frame(&mut sender, &ServerFrame::Error {
                            error: "binary frames are not supported".to_string(),
                        }).await;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(client_id = %client_id, error = %e, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    registry.disconnect(&client_id);
}

async fn handle_client_frame(
    registry: &Registry,
    client_id: &str,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    text: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            let _ = send_frame(sender, &ServerFrame::Error { error: format!("malformed frame: {e}") }).await;
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { execution_id } => {
            registry.subscribe(client_id, &execution_id);
            let _ = send_frame(sender, &ServerFrame::Subscribed { execution_id }).await;
        }
        ClientFrame::Unsubscribe { execution_id } => {
            registry.unsubscribe(client_id, &execution_id);
            let _ = send_frame(sender, &ServerFrame::Unsubscribed { execution_id }).await;
        }
        ClientFrame::Ping => {
            let _ = send_frame(sender, &ServerFrame::Pong).await;
        }
    }
}

async fn send_frame(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).expect("ServerFrame always serializes");
    sender.send(Message::Text(json)).await
}

/// Periodically closes connections idle past `idle_timeout_secs` (spec §6:
/// "server closes after 60s idle"). Runs until the process shuts down.
pub async fn idle_reaper(registry: Arc<Registry>, idle_timeout_secs: i64, sweep_interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(sweep_interval);
    loop {
        ticker.tick().await;
        for client_id in registry.stale_connections(idle_timeout_secs) {
            tracing::debug!(client_id = %client_id, "evicting idle connection");
            registry.evict(&client_id);
        }
    }
}
