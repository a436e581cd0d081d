//! UseCase: 制御プレーンとトランスポートに公開する操作
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - PushService::push_message() のファンアウト
//! - 接続イベント（opened / bind / remove）とソケット関連付け
//!
//! ### なぜこのテストが必要か
//! - 1 つのハンドルの送信失敗が他のハンドルへの配信を妨げないことを保証
//! - 複数デバイスのユーザーにはすべての Bound な接続に届くことを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：登録 → 接続 → プッシュ
//! - 異常系：送信失敗、未知の接続、Bound な slot への再関連付け
//! - エッジケース：受信者 0 件

use std::{sync::Arc, time::Duration};

use crate::domain::{ConnectionId, ConnectionSlot, PushMessage, SlotId, TransportHandle, UserId};

use super::{error::RegistryError, registry::ConnectionRegistry};

/// ファンアウトの結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// このプロセスが保持しているライブなハンドル数
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// プッシュ配信のユースケース
pub struct PushService {
    registry: Arc<ConnectionRegistry>,
}

impl PushService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// 登録 API: ユーザーの接続予定を Pending slot として記録
    pub async fn register_user(&self, user: &UserId, slot_id: &SlotId) -> Result<(), RegistryError> {
        tracing::info!(
            "Register user: userId '{}' connectionId {}",
            user,
            slot_id.masked()
        );
        self.registry.register_intent(user, slot_id).await
    }

    /// トランスポート接続が開いた
    pub async fn connection_opened(&self, handle: Arc<dyn TransportHandle>) {
        tracing::info!("Socket '{}' connected", handle.connection_id());
        self.registry.track_handle(handle).await;
    }

    /// トランスポートが register を名乗った
    pub async fn bind_connection(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        handle: Arc<dyn TransportHandle>,
    ) -> Result<bool, RegistryError> {
        self.registry.bind_transport(user, slot_id, handle).await
    }

    /// `connection_opened` 済みの接続が register を名乗った
    ///
    /// bind の途中で切断イベントが先に処理された場合は slot を残さず `false` を返す。
    pub async fn bind_open_connection(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        handle: Arc<dyn TransportHandle>,
    ) -> Result<bool, RegistryError> {
        self.registry.bind_tracked(user, slot_id, handle).await
    }

    /// 既に開いている接続をユーザーに関連付ける（slot id は接続 id と同じ）
    ///
    /// 接続がこのプロセスに無ければ `RegistryError::UnknownConnection`。
    pub async fn associate_socket(
        &self,
        user: &UserId,
        connection_id: &ConnectionId,
    ) -> Result<bool, RegistryError> {
        let handle = self
            .registry
            .find_handle(connection_id)
            .await
            .ok_or_else(|| RegistryError::UnknownConnection(connection_id.to_string()))?;

        let slot_id = SlotId::for_connection(connection_id);
        self.registry.register_intent(user, &slot_id).await?;
        self.registry.bind_tracked(user, &slot_id, handle).await
    }

    /// 切断イベント。ストアの失敗はログに残して握りつぶす
    pub async fn remove_connection(&self, connection_id: &ConnectionId) {
        tracing::info!("Socket '{}' disconnected", connection_id);
        if let Err(e) = self.registry.unbind_by_handle(connection_id).await {
            tracing::error!(
                "Failed to clean up slots of socket '{}': {}",
                connection_id,
                e
            );
        }
    }

    /// ユーザーのすべてのライブな接続にメッセージを送る
    ///
    /// 各ハンドルの失敗は warn ログと `PushReport::failed` にだけ反映される。
    pub async fn push_message(
        &self,
        user: &UserId,
        message: &PushMessage,
    ) -> Result<PushReport, RegistryError> {
        let handles = self.registry.list_live_handles(user).await?;
        let mut report = PushReport {
            recipients: handles.len(),
            ..PushReport::default()
        };

        for handle in &handles {
            match handle.send(message) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to push to socket '{}' of user '{}': {}",
                        handle.connection_id(),
                        user,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Pushed message to user '{}': {} delivered, {} failed",
            user,
            report.delivered,
            report.failed
        );
        Ok(report)
    }

    pub async fn connections(&self, user: &UserId) -> Result<Vec<ConnectionSlot>, RegistryError> {
        self.registry.list_slots(user).await
    }

    pub async fn drop_slot(&self, user: &UserId, slot_id: &SlotId) -> Result<(), RegistryError> {
        tracing::info!(
            "Drop connection {} of user '{}'",
            slot_id.masked(),
            user
        );
        self.registry.remove_slot(user, slot_id).await
    }

    pub async fn purge_pending(&self, older_than: Duration) -> Result<usize, RegistryError> {
        self.registry.purge_pending(older_than).await
    }
}
