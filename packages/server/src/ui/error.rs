//! HTTP エラーレスポンス

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{domain::ValueObjectError, usecase::RegistryError};

/// 制御 API のエラー
///
/// レスポンスボディはステータスの理由句だけ（401 は空）。
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Conflict(String),
    /// リトライしても直らないストアの失敗（壊れたレコードなど）
    Internal(String),
    /// リトライで直りうるストアの失敗
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Unauthorized => status.into_response(),
            ApiError::Internal(reason) | ApiError::Unavailable(reason) => {
                tracing::error!("Request failed: {}", reason);
                (status, status.canonical_reason().unwrap_or_default()).into_response()
            }
            ApiError::BadRequest(reason)
            | ApiError::NotFound(reason)
            | ApiError::Conflict(reason) => {
                tracing::info!("Request rejected ({}): {}", status, reason);
                (status, status.canonical_reason().unwrap_or_default()).into_response()
            }
        }
    }
}

impl From<ValueObjectError> for ApiError {
    fn from(e: ValueObjectError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Storage(e) if e.is_retryable() => ApiError::Unavailable(e.to_string()),
            RegistryError::Storage(e) => ApiError::Internal(e.to_string()),
            e @ RegistryError::SlotAlreadyBound { .. } => ApiError::Conflict(e.to_string()),
            e @ RegistryError::UnknownConnection(_) => ApiError::NotFound(e.to_string()),
        }
    }
}
