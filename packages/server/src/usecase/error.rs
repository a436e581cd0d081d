//! UseCase 層のエラー

use thiserror::Error;

use crate::domain::StorageError;

/// ConnectionRegistry / PushService のエラー
///
/// bind の競合はエラーではなく `false` で表します。
#[derive(Debug, Error)]
pub enum RegistryError {
    /// ストアの往復が失敗した（リトライは呼び出し元の判断）
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// 既に Bound な slot を再登録しようとした
    #[error("slot '{slot_id}' of user '{user}' is already bound")]
    SlotAlreadyBound { user: String, slot_id: String },

    /// このプロセスにその id のライブな接続が無い
    #[error("no live connection with id '{0}'")]
    UnknownConnection(String),
}
