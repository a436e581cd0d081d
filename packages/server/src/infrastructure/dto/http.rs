//! HTTP API request/response DTOs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query of `PUT /api/{userId}/register`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterQuery {
    pub connection_id: Option<String>,
}

/// Body of `POST /api/{userId}/push`
#[derive(Debug, Default, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub message: Option<Value>,
}

/// Body of `POST /users/{userId}/sockets`
#[derive(Debug, Default, Deserialize)]
pub struct SocketAssociationRequest {
    #[serde(default)]
    pub socket_id: Option<String>,
}

/// Body of `POST /api/admin/purge-pending`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgePendingRequest {
    pub older_than_secs: u64,
}

/// Response of `POST /api/admin/purge-pending`
#[derive(Debug, Serialize, Deserialize)]
pub struct PurgePendingResponse {
    pub removed: usize,
}

/// Response of `GET /api/status/info`
#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
}

/// Slot state as shown by the admin listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStateDto {
    Pending,
    Bound,
}

/// One entry of `GET /api/{userId}/connections`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDto {
    pub id: String,
    pub state: SlotStateDto,
    pub socket_id: Option<String>,
    pub registered_date: Option<String>,
    pub saved_date: Option<String>,
}
