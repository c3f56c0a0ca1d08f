//! WebSocket endpoint for the app.
//!
//! Each socket registers with the [`ConnectionRegistry`](crate::connections::ConnectionRegistry),
//! receives a greeting snapshot, then gets every broadcast until it closes.
//! Pings go out on a fixed interval; reconnecting is the client's job.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::{connections::greeting, state::AppContext};

pub(crate) async fn ws_upgrade(
    State(ctx): State<Arc<AppContext>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(ctx, socket))
}

async fn handle_socket(ctx: Arc<AppContext>, socket: WebSocket) {
    let mut handle = ctx.connections.open().await;
    let id = handle.id;
    let active = ctx.connections.active_count().await;
    info!(connection = %id, active, "realtime client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let greeting_text = greeting(&ctx)
        .await
        .and_then(|r| serde_json::to_string(&r).map_err(Into::into));
    let greeted = match greeting_text {
        Ok(text) => ws_tx.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            // Keep the connection; broadcasts still work without a greeting.
            error!(connection = %id, error = %format!("{e:#}"), "greeting failed");
            true
        }
    };

    if greeted {
        let mut ping = tokio::time::interval(ctx.config.ping_interval());
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ping.tick().await;

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Ping(payload))) => {
                            if ws_tx.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(connection = %id, "client closed");
                            break;
                        }
                        Some(Err(e)) => {
                            debug!(connection = %id, error = %e, "socket error");
                            break;
                        }
                        // Clients have nothing to say beyond pongs.
                        Some(Ok(_)) => {}
                    }
                }
                outbound = handle.rx.recv() => {
                    match outbound {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    ctx.connections.close(id).await;
    ctx.connections.prune().await;
    let active = ctx.connections.active_count().await;
    info!(connection = %id, active, "realtime client disconnected");
}
