//! Server state shared by the handlers.

use std::sync::Arc;

use crate::usecase::PushService;

/// Shared application state
pub struct AppState {
    /// PushService（登録・接続・配信のユースケース）
    pub push_service: Arc<PushService>,
    /// 制御 API の `X-AUTH-TOKEN` と照合する共有シークレット
    pub auth_token: String,
}
