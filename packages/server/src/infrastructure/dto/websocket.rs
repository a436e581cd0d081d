//! WebSocket event DTOs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type tag carried in every frame's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    /// server → client: connection accepted, carries the socket id
    Connected,
    /// client → server: bind this socket to a registered slot
    Register,
    /// server → client: outcome of a register event
    RegisterResult,
    /// server → client: pushed message
    Message,
}

/// Sent once right after the upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub r#type: MessageType,
    pub socket_id: String,
}

/// Client-emitted registration completing the handshake from the socket side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMessage {
    pub r#type: MessageType,
    pub user_id: String,
    pub connection_id: String,
}

/// Reply to a `register` event. `registered: false` means no matching pending
/// registration existed and the client should register again or give up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResultMessage {
    pub r#type: MessageType,
    pub user_id: String,
    pub connection_id: String,
    pub registered: bool,
}

/// Pushed message delivered to every bound socket of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEventMessage {
    pub r#type: MessageType,
    pub message: Value,
}
