//! Live updates over WebSocket

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::auth::AuthError;
use crate::realtime::{Broadcaster, ClientMessage, LiveEvent};

use super::handlers::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return AuthError::MissingToken.into_response();
    };
    let user = match state.auth.authenticate(&token).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    info!("Live client connected: {}", user.username);
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

async fn handle_socket(socket: WebSocket, broadcaster: Broadcaster) {
    let id = broadcaster.register();
    let mut events = broadcaster.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    // Last typing payload this client announced
    let mut typing: Option<Value> = None;

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(ClientMessage::UserTyping(data)) => {
                            typing = Some(data.clone());
                            broadcaster.publish_from(id, LiveEvent::UserTyping(data));
                        }
                        Ok(ClientMessage::UserStoppedTyping(data)) => {
                            typing = None;
                            broadcaster.publish_from(id, LiveEvent::UserStoppedTyping(data));
                        }
                        Ok(ClientMessage::Pong) => {}
                        Err(e) => debug!("Ignoring client message on {}: {}", id, e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Socket {} errored: {}", id, e);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(message) if message.is_from(id) => {}
                Ok(message) => {
                    if send_event(&mut sender, &message.event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Socket {} lagged, skipped {} events", id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = heartbeat.tick() => {
                if send_event(&mut sender, &LiveEvent::Ping).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(data) = typing {
        broadcaster.publish_from(id, LiveEvent::UserStoppedTyping(data));
    }
    debug!("Socket {} disconnected", id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &LiveEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize live event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}
