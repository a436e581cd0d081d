//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, SlotId, UserId},
    infrastructure::{
        dto::websocket::{ConnectedMessage, MessageType, RegisterMessage, RegisterResultMessage},
        transport::WebSocketHandle,
    },
    ui::state::AppState,
};

/// Query parameters for WebSocket connection
///
/// 両方が揃っていれば接続直後に bind を試みる。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    pub user_id: Option<String>,
    pub connection_id: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

/// Spawns a task that receives messages from the rx channel and pushes them to the WebSocket sender.
///
/// 送信に失敗した（クライアントが切断した）時点でループを抜ける。
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: ConnectQuery) {
    let connection_id = ConnectionId::generate();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = Arc::new(WebSocketHandle::new(connection_id.clone(), tx));

    state.push_service.connection_opened(handle.clone()).await;

    let (sender, mut receiver) = socket.split();
    let mut send_task = pusher_loop(rx, sender);

    let connected = ConnectedMessage {
        r#type: MessageType::Connected,
        socket_id: connection_id.to_string(),
    };
    if let Err(e) = handle.send_event(&connected) {
        tracing::warn!("Failed to send connected event to '{}': {}", connection_id, e);
    }

    if let (Some(user_id), Some(slot_id)) = (query.user_id, query.connection_id) {
        spawn_bind(state.clone(), handle.clone(), user_id, slot_id);
    }

    let state_clone = state.clone();
    let handle_clone = handle.clone();

    // Spawn a task to receive events from this client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error on '{}': {}", handle_clone.id(), e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => match serde_json::from_str::<RegisterMessage>(&text) {
                    Ok(event) if event.r#type == MessageType::Register => {
                        spawn_bind(
                            state_clone.clone(),
                            handle_clone.clone(),
                            event.user_id,
                            event.connection_id,
                        );
                    }
                    Ok(event) => {
                        tracing::debug!("Ignoring client event of type {:?}", event.r#type);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse client event: {}", e);
                    }
                },
                Message::Ping(_) => {
                    tracing::debug!("Received ping");
                    // Ping/pong is handled automatically by the WebSocket protocol
                }
                Message::Close(_) => {
                    tracing::info!(
                        "Socket '{}' requested close",
                        handle_clone.id()
                    );
                    break;
                }
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    state.push_service.remove_connection(&connection_id).await;
}

/// register イベント（またはクエリ）を bind し、結果を register-result で返す
///
/// 受信タスクが abort されても bind が途中で止まらないよう別タスクで実行する。
/// 切断処理が先に走った場合は `bind_open_connection` が slot を巻き戻す。
fn spawn_bind(state: Arc<AppState>, handle: Arc<WebSocketHandle>, user_id: String, slot_id: String) {
    tokio::spawn(async move {
        let registered = match (
            UserId::try_from(user_id.as_str()),
            SlotId::try_from(slot_id.as_str()),
        ) {
            (Ok(user), Ok(slot)) => match state
                .push_service
                .bind_open_connection(&user, &slot, handle.clone())
                .await
            {
                Ok(bound) => bound,
                Err(e) => {
                    tracing::warn!(
                        "Failed to bind socket '{}' for user '{}': {}",
                        handle.id(),
                        user,
                        e
                    );
                    false
                }
            },
            _ => {
                tracing::warn!(
                    "Invalid register event from socket '{}'",
                    handle.id()
                );
                false
            }
        };

        let result = RegisterResultMessage {
            r#type: MessageType::RegisterResult,
            user_id,
            connection_id: slot_id,
            registered,
        };
        if let Err(e) = handle.send_event(&result) {
            tracing::debug!(
                "Socket '{}' closed before register-result: {}",
                handle.id(),
                e
            );
        }
    });
}
