//! 制御 API の共有シークレット認証

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::{error::ApiError, state::AppState};

/// 共有シークレットを運ぶヘッダー
pub const AUTH_HEADER: &str = "x-auth-token";

/// `X-AUTH-TOKEN` が設定値とバイト単位で一致しないリクエストを 401 で拒否する
///
/// ハンドラーより前に走るので、拒否されたリクエストは何も変更しない。
pub async fn require_auth_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = request
        .headers()
        .get(AUTH_HEADER)
        .map(|value| value.as_bytes() == state.auth_token.as_bytes())
        .unwrap_or(false);

    if !authorized {
        tracing::warn!(
            "Rejected {} {}: missing or invalid auth token",
            request.method(),
            request.uri().path()
        );
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
