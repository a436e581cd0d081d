//! ConnectionStore trait 定義
//!
//! ユーザーごとの slot 集合に対するキー・バリュー抽象です。UseCase 層はこの trait
//! にだけ依存し、どのバックエンドが動いているかで分岐しません。
//!
//! ## 実装上の約束
//!
//! - ユーザー単位で操作が直列化されること（グローバルロックは不要）
//! - `try_bind` は条件付き更新 1 回で行うこと（read-then-write 禁止）
//! - 失敗は `StorageError` として返し、内部でリトライしないこと

use async_trait::async_trait;

use super::{
    error::StorageError,
    slot::{ConnectionSlot, SlotCreation},
    value_object::{ConnectionId, SlotId, Timestamp, UserId},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Pending slot を作成する。重複 id の扱いは `SlotCreation` を参照
    async fn create_pending_slot(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        created_at: Timestamp,
    ) -> Result<SlotCreation, StorageError>;

    /// Pending → Bound をアトミックに行う。slot が無いか既に Bound なら `false`（変更なし）
    async fn try_bind(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        connection_id: &ConnectionId,
        bound_at: Timestamp,
    ) -> Result<bool, StorageError>;

    /// slot を状態に関係なく削除する（冪等）
    async fn remove_slot(&self, user: &UserId, slot_id: &SlotId) -> Result<(), StorageError>;

    /// Bound な接続 id を挿入順で返す
    async fn list_bound_handles(&self, user: &UserId) -> Result<Vec<ConnectionId>, StorageError>;

    /// 全 slot を挿入順で返す（管理用）
    async fn list_slots(&self, user: &UserId) -> Result<Vec<ConnectionSlot>, StorageError>;

    /// `cutoff` より前に作成された Pending slot を全ユーザーから削除し、削除数を返す
    async fn purge_pending_before(&self, cutoff: Timestamp) -> Result<usize, StorageError>;
}
