//! HTTP API endpoint handlers.

use std::{sync::Arc, time::Duration};

use axum::{
    Form, Json,
    body::Bytes,
    extract::{FromRequest, Path, Query, Request, State},
    http::header,
};
use serde::de::DeserializeOwned;

use crate::{
    domain::{ConnectionId, PushMessage, SlotId, UserId},
    infrastructure::dto::http::{
        InfoResponse, PurgePendingRequest, PurgePendingResponse, PushRequest, RegisterQuery,
        SlotDto, SocketAssociationRequest,
    },
    ui::{error::ApiError, state::AppState},
};

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

/// ボディを DTO に変換する
///
/// `application/x-www-form-urlencoded` はフォームとして、それ以外は JSON として読む。
/// 読めないボディは 400。
async fn parse_body<T: DeserializeOwned>(request: Request) -> Result<T, ApiError> {
    if is_form(&request) {
        let Form(body) = Form::<T>::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(format!("invalid form body: {}", e)))?;
        return Ok(body);
    }

    let body = Bytes::from_request(request, &())
        .await
        .map_err(|e| ApiError::BadRequest(format!("unreadable body: {}", e)))?;
    serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid body: {}", e)))
}

/// `PUT /api/{userId}/register?connectionId=...`
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<RegisterQuery>,
) -> Result<(), ApiError> {
    let user = UserId::try_from(user_id)?;
    let slot_id = SlotId::try_from(query.connection_id.unwrap_or_default())?;

    state.push_service.register_user(&user, &slot_id).await?;
    Ok(())
}

/// `POST /api/{userId}/push`
pub async fn push_message(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    request: Request,
) -> Result<(), ApiError> {
    let user = UserId::try_from(user_id)?;
    let request: PushRequest = parse_body(request).await?;
    let message = PushMessage::new(request.message.unwrap_or_default())?;

    state.push_service.push_message(&user, &message).await?;
    Ok(())
}

/// `POST /users/{userId}/sockets`
///
/// 既に開いている WebSocket を接続 id でユーザーに関連付ける。
pub async fn associate_socket(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    request: Request,
) -> Result<(), ApiError> {
    let user = UserId::try_from(user_id)?;
    let request: SocketAssociationRequest = parse_body(request).await?;
    let connection_id = ConnectionId::try_from(request.socket_id.unwrap_or_default())?;

    if !state
        .push_service
        .associate_socket(&user, &connection_id)
        .await?
    {
        return Err(ApiError::Conflict(format!(
            "socket '{}' could not be bound",
            connection_id
        )));
    }
    Ok(())
}

/// `GET /api/{userId}/connections`
pub async fn list_connections(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<SlotDto>>, ApiError> {
    let user = UserId::try_from(user_id)?;
    let slots = state.push_service.connections(&user).await?;

    // Domain Model から DTO への変換
    Ok(Json(slots.iter().map(SlotDto::from).collect()))
}

/// `DELETE /api/{userId}/connections/{slotId}`
pub async fn remove_slot(
    State(state): State<Arc<AppState>>,
    Path((user_id, slot_id)): Path<(String, String)>,
) -> Result<(), ApiError> {
    let user = UserId::try_from(user_id)?;
    let slot_id = SlotId::try_from(slot_id)?;

    state.push_service.drop_slot(&user, &slot_id).await?;
    Ok(())
}

/// `POST /api/admin/purge-pending`
pub async fn purge_pending(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<PurgePendingResponse>, ApiError> {
    let request: PurgePendingRequest = parse_body(request).await?;
    let removed = state
        .push_service
        .purge_pending(Duration::from_secs(request.older_than_secs))
        .await?;

    Ok(Json(PurgePendingResponse { removed }))
}

/// `GET /api/status/ping`
pub async fn ping() -> &'static str {
    "pong"
}

/// `GET /api/status/info`
pub async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
